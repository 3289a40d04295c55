/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use serde::{Deserialize, Serialize};

/// Elapsed time in (fractional) microseconds.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(transparent)]
pub struct MicroSeconds(f64);

impl MicroSeconds {
    /// Construct a new instance over a raw number of microseconds. Negative values are
    /// clamped to zero.
    pub fn new(micros: f64) -> Self {
        Self(micros.max(0.0))
    }

    /// Return `self` as seconds.
    pub fn as_seconds(self) -> f64 {
        self.0 / 1_000_000.0
    }

    /// Return `self` as microseconds.
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl From<std::time::Duration> for MicroSeconds {
    fn from(value: std::time::Duration) -> Self {
        Self::new(value.as_secs_f64() * 1_000_000.0)
    }
}

impl std::fmt::Display for MicroSeconds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}us", self.0)
    }
}

impl std::ops::Add for MicroSeconds {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

/// Evaluate an expression and return `(MicroSeconds, value)`.
#[doc(hidden)]
#[macro_export]
macro_rules! timed {
    ($($exprs:tt)*) => {{
        let start = ::std::time::Instant::now();
        let result = $($exprs)*;
        let elapsed: $crate::utils::MicroSeconds = start.elapsed().into();
        (elapsed, result)
    }}
}

///////////
// Tests //
///////////
