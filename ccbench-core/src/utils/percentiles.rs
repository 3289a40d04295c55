/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("input slice cannot be empty")]
pub struct CannotBeEmpty;

/// How a percentile is read out of a sorted sample.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PercentileMethod {
    /// Read the sample at index `floor(p * len)`, clamped to `len - 1`.
    ///
    /// This is biased upwards for small samples but matches the numbers reported by
    /// earlier versions of the harness, so results stay comparable across runs.
    #[default]
    Index,
    /// Linear interpolation between the two closest ranks.
    Interpolated,
}

impl PercentileMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Interpolated => "interpolated",
        }
    }
}

impl std::fmt::Display for PercentileMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Percentiles {
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

pub fn mean(x: &[f64]) -> Result<f64, CannotBeEmpty> {
    if x.is_empty() {
        return Err(CannotBeEmpty);
    }
    Ok(x.iter().sum::<f64>() / x.len() as f64)
}

/// Read the `percent`-th percentile from an ascending `sorted` slice.
///
/// `percent` is an integer in `0..=100` so the raw index can be computed exactly.
pub fn percentile(sorted: &[f64], percent: usize, method: PercentileMethod) -> Result<f64, CannotBeEmpty> {
    let len = sorted.len();
    if len == 0 {
        return Err(CannotBeEmpty);
    }

    let percent = percent.min(100);
    let value = match method {
        PercentileMethod::Index => sorted[((percent * len) / 100).min(len - 1)],
        PercentileMethod::Interpolated => {
            let rank = (percent as f64 / 100.0) * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    };
    Ok(value)
}

/// Return the mean, median, 95th and 99th percentile and the maximum of `x`.
///
/// NOTE: This is implemented by sorting the input slice.
pub fn compute_percentiles(x: &mut [f64], method: PercentileMethod) -> Result<Percentiles, CannotBeEmpty> {
    let mean = mean(x)?;
    x.sort_unstable_by(f64::total_cmp);

    Ok(Percentiles {
        mean,
        p50: percentile(x, 50, method)?,
        p95: percentile(x, 95, method)?,
        p99: percentile(x, 99, method)?,
        max: x[x.len() - 1],
    })
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[test]
    fn test_mean() {
        assert!(matches!(mean(&[]).unwrap_err(), CannotBeEmpty));
        assert_eq!(mean(&[1.0, 2.0, 3.0, 6.0]).unwrap(), 3.0);
    }

    #[test]
    fn test_empty() {
        let empty: &mut [f64] = &mut [];
        assert!(compute_percentiles(empty, PercentileMethod::Index).is_err());
        assert!(percentile(&[], 50, PercentileMethod::Interpolated).is_err());
    }

    #[test]
    fn test_index_convention() {
        // 20 samples: p95 reads index 19, p50 reads index 10.
        let mut x: Vec<f64> = (0..20).rev().map(|i| i as f64).collect();
        let p = compute_percentiles(&mut x, PercentileMethod::Index).unwrap();
        assert_eq!(p.p50, 10.0);
        assert_eq!(p.p95, 19.0);
        assert_eq!(p.p99, 19.0);
        assert_eq!(p.max, 19.0);
        assert_eq!(p.mean, 9.5);

        // 100 samples: p95 reads index 95, p99 reads index 99.
        let mut x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let p = compute_percentiles(&mut x, PercentileMethod::Index).unwrap();
        assert_eq!(p.p95, 95.0);
        assert_eq!(p.p99, 99.0);
    }

    #[test]
    fn test_interpolated() {
        let x = [0.0, 10.0];
        assert_eq!(percentile(&x, 50, PercentileMethod::Interpolated).unwrap(), 5.0);
        assert_eq!(percentile(&x, 100, PercentileMethod::Interpolated).unwrap(), 10.0);
        assert_eq!(percentile(&x, 0, PercentileMethod::Interpolated).unwrap(), 0.0);
    }

    #[rstest]
    fn test_ordering(
        #[values(1, 2, 3, 7, 19, 20, 101, 1000)] len: usize,
        #[values(PercentileMethod::Index, PercentileMethod::Interpolated)] method: PercentileMethod,
    ) {
        let mut x: Vec<f64> = (0..len).map(|i| ((i * 7919) % 1013) as f64).collect();
        let p = compute_percentiles(&mut x, method).unwrap();
        assert!(p.p50 <= p.p95);
        assert!(p.p95 <= p.p99);
        assert!(p.p99 <= p.max);
    }

    #[test]
    fn test_serde_method() {
        let method: PercentileMethod = serde_json::from_str("\"interpolated\"").unwrap();
        assert_eq!(method, PercentileMethod::Interpolated);
        assert_eq!(PercentileMethod::default().to_string(), "index");
    }
}
