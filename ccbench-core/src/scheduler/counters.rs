/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::{index::Status, latency::OperationKind};

/// Lock-free success/failure counters shared by all worker tasks.
#[derive(Debug, Default)]
pub struct OperationCounters {
    inserts_succeeded: AtomicUsize,
    inserts_failed: AtomicUsize,
    searches_succeeded: AtomicUsize,
    searches_failed: AtomicUsize,
}

/// A point-in-time copy of [`OperationCounters`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounts {
    pub inserts_succeeded: usize,
    pub inserts_failed: usize,
    pub searches_succeeded: usize,
    pub searches_failed: usize,
}

impl OperationCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `n` operations of `kind` that finished with `status`.
    pub fn record(&self, kind: OperationKind, status: Status, n: usize) {
        let counter = match (kind, status) {
            (OperationKind::Insert, Status::Success) => &self.inserts_succeeded,
            (OperationKind::Insert, Status::Failure) => &self.inserts_failed,
            (OperationKind::Search, Status::Success) => &self.searches_succeeded,
            (OperationKind::Search, Status::Failure) => &self.searches_failed,
        };
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OperationCounts {
        OperationCounts {
            inserts_succeeded: self.inserts_succeeded.load(Ordering::Relaxed),
            inserts_failed: self.inserts_failed.load(Ordering::Relaxed),
            searches_succeeded: self.searches_succeeded.load(Ordering::Relaxed),
            searches_failed: self.searches_failed.load(Ordering::Relaxed),
        }
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind_and_status() {
        let counters = OperationCounters::new();
        counters.record(OperationKind::Insert, Status::Success, 3);
        counters.record(OperationKind::Insert, Status::Failure, 1);
        counters.record(OperationKind::Search, Status::Success, 5);
        counters.record(OperationKind::Search, Status::Failure, 2);
        counters.record(OperationKind::Search, Status::Failure, 1);

        assert_eq!(
            counters.snapshot(),
            OperationCounts {
                inserts_succeeded: 3,
                inserts_failed: 1,
                searches_succeeded: 5,
                searches_failed: 3,
            }
        );
    }
}
