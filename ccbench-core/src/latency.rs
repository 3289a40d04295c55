/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::{
    pool::lock,
    utils::{MicroSeconds, PercentileMethod, percentiles},
};

/// The class of a timed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Search,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Search => "search",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency statistics for one operation class, in microseconds.
///
/// An empty class summarizes to all zeros.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

impl LatencySummary {
    /// Summarize `samples`, sorting them in place.
    pub fn compute(samples: &mut [f64], method: PercentileMethod) -> Self {
        match percentiles::compute_percentiles(samples, method) {
            Ok(p) => Self {
                count: samples.len(),
                mean: p.mean,
                p50: p.p50,
                p95: p.p95,
                p99: p.p99,
                max: p.max,
            },
            Err(percentiles::CannotBeEmpty) => Self::default(),
        }
    }
}

/// Thread-safe accumulator of per-operation latency samples.
///
/// Each class has its own append-only vector behind a mutex. Sample order carries no
/// meaning.
#[derive(Debug, Default)]
pub struct LatencyRecorder {
    insert: Mutex<Vec<f64>>,
    search: Mutex<Vec<f64>>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn class(&self, kind: OperationKind) -> &Mutex<Vec<f64>> {
        match kind {
            OperationKind::Insert => &self.insert,
            OperationKind::Search => &self.search,
        }
    }

    pub fn record(&self, kind: OperationKind, elapsed: MicroSeconds) {
        lock(self.class(kind)).push(elapsed.as_f64());
    }

    pub fn len(&self, kind: OperationKind) -> usize {
        lock(self.class(kind)).len()
    }

    pub fn is_empty(&self, kind: OperationKind) -> bool {
        self.len(kind) == 0
    }

    /// A copy of the samples recorded for `kind`, in arrival order.
    pub fn samples(&self, kind: OperationKind) -> Vec<f64> {
        lock(self.class(kind)).clone()
    }

    pub fn summary(&self, kind: OperationKind, method: PercentileMethod) -> LatencySummary {
        let mut samples = self.samples(kind);
        LatencySummary::compute(&mut samples, method)
    }
}

///////////
// Tests //
///////////
