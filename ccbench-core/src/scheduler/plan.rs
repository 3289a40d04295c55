/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User-facing description of a mixed insert/search workload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkloadParams {
    /// Number of points the index is built from before the mixed phase.
    pub begin_num: usize,
    /// Number of inserts issued per batch.
    pub batch_size: usize,
    /// Fraction of operations that are inserts, in `(0, 1]`.
    pub write_ratio: f64,
    /// Number of neighbors requested per search.
    pub recall_at: usize,
    /// Search the points inserted by the current batch instead of the query set.
    pub query_new_data: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("write ratio must be in (0, 1], got {0}")]
    InvalidWriteRatio(f64),
    #[error("batch size must be positive")]
    ZeroBatchSize,
    #[error("recall_at must be positive")]
    ZeroRecallAt,
    #[error("begin_num ({begin_num}) exceeds the number of data points ({data_count})")]
    BeginExceedsData { begin_num: usize, data_count: usize },
    #[error("the workload issues {search_total} searches but the query set is empty")]
    NoQueries { search_total: usize },
    #[error(
        "a batch size of {batch_size} at write ratio {write_ratio} yields no searches per batch \
         while {search_total} searches are required; increase the batch size"
    )]
    SearchBatchTooSmall {
        batch_size: usize,
        write_ratio: f64,
        search_total: usize,
    },
}

// `floor(n * ratio)`, tolerating the representation error of `ratio` so that products
// which are whole numbers in exact arithmetic (e.g. `100 * 0.25`) are not truncated down.
fn scaled(n: usize, ratio: f64) -> usize {
    let product = n as f64 * ratio;
    ((product * 1e9).round() / 1e9).floor() as usize
}

/// Operation counts derived from [`WorkloadParams`] and the size of the data set.
///
/// With `ratio = (1 - write_ratio) / write_ratio`:
///
/// * `insert_total = data_count - begin_num`
/// * `search_total = floor(insert_total * ratio)`
/// * `search_batch_size = floor(batch_size * ratio)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadPlan {
    params: WorkloadParams,
    data_count: usize,
    insert_total: usize,
    search_total: usize,
    search_batch_size: usize,
}

impl WorkloadPlan {
    pub fn new(
        params: WorkloadParams,
        data_count: usize,
        query_count: usize,
    ) -> Result<Self, PlanError> {
        let r = params.write_ratio;
        if !r.is_finite() || r <= 0.0 || r > 1.0 {
            return Err(PlanError::InvalidWriteRatio(r));
        }
        if params.batch_size == 0 {
            return Err(PlanError::ZeroBatchSize);
        }
        if params.recall_at == 0 {
            return Err(PlanError::ZeroRecallAt);
        }
        if params.begin_num > data_count {
            return Err(PlanError::BeginExceedsData {
                begin_num: params.begin_num,
                data_count,
            });
        }

        let ratio = (1.0 - r) / r;
        let insert_total = data_count - params.begin_num;
        let search_total = scaled(insert_total, ratio);
        let search_batch_size = scaled(params.batch_size, ratio);

        if search_total > 0 {
            if !params.query_new_data && query_count == 0 {
                return Err(PlanError::NoQueries { search_total });
            }
            if search_batch_size == 0 {
                return Err(PlanError::SearchBatchTooSmall {
                    batch_size: params.batch_size,
                    write_ratio: r,
                    search_total,
                });
            }
        }

        Ok(Self {
            params,
            data_count,
            insert_total,
            search_total,
            search_batch_size,
        })
    }

    pub fn params(&self) -> &WorkloadParams {
        &self.params
    }

    pub fn data_count(&self) -> usize {
        self.data_count
    }

    pub fn begin_num(&self) -> usize {
        self.params.begin_num
    }

    pub fn batch_size(&self) -> usize {
        self.params.batch_size
    }

    pub fn insert_total(&self) -> usize {
        self.insert_total
    }

    pub fn search_total(&self) -> usize {
        self.search_total
    }

    pub fn search_batch_size(&self) -> usize {
        self.search_batch_size
    }

    /// The number of points in the index once the inserts of `progress` have completed.
    pub fn insertion_offset(&self, progress: &BatchProgress) -> usize {
        self.params.begin_num + progress.end_insert
    }

    /// Data indices (and tags) of the points inserted by `progress`.
    pub fn insert_points(&self, progress: &BatchProgress) -> Range<usize> {
        let begin = self.params.begin_num;
        begin + progress.start_insert..begin + progress.end_insert
    }

    /// Iterate over the batches of the mixed phase.
    pub fn batches(&self) -> Batches<'_> {
        Batches {
            plan: self,
            next: BatchProgress::default(),
            done: self.insert_total == 0 && self.search_total == 0,
        }
    }
}

/// Offsets of one batch of the mixed phase.
///
/// Offsets count operations issued since the end of the build phase and never decrease
/// from one batch to the next.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub batch: usize,
    pub start_insert: usize,
    pub end_insert: usize,
    pub start_search: usize,
    pub end_search: usize,
    /// Position of the query selector after this batch's searches were issued. Filled in
    /// by the scheduler.
    pub query_cursor: usize,
}

impl BatchProgress {
    pub fn inserts(&self) -> Range<usize> {
        self.start_insert..self.end_insert
    }

    pub fn searches(&self) -> Range<usize> {
        self.start_search..self.end_search
    }
}

/// Iterator over the [`BatchProgress`] of every batch in a [`WorkloadPlan`].
///
/// Iteration stops after the first batch that exhausts both quotas. Once the inserts are
/// exhausted, the remaining batches only carry searches.
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    plan: &'a WorkloadPlan,
    next: BatchProgress,
    done: bool,
}

impl Iterator for Batches<'_> {
    type Item = BatchProgress;

    fn next(&mut self) -> Option<BatchProgress> {
        if self.done {
            return None;
        }

        let plan = self.plan;
        let mut this = self.next;
        this.end_insert = (this.start_insert + plan.batch_size()).min(plan.insert_total);
        this.end_search = (this.start_search + plan.search_batch_size).min(plan.search_total);

        self.done = this.end_insert == plan.insert_total && this.end_search == plan.search_total;
        self.next = BatchProgress {
            batch: this.batch + 1,
            start_insert: this.end_insert,
            end_insert: this.end_insert,
            start_search: this.end_search,
            end_search: this.end_search,
            query_cursor: 0,
        };
        Some(this)
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn params(begin_num: usize, batch_size: usize, write_ratio: f64) -> WorkloadParams {
        WorkloadParams {
            begin_num,
            batch_size,
            write_ratio,
            recall_at: 1,
            query_new_data: false,
        }
    }

    #[test]
    fn small_even_workload() {
        let plan = WorkloadPlan::new(params(2, 2, 0.5), 6, 3).unwrap();
        assert_eq!(plan.insert_total(), 4);
        assert_eq!(plan.search_total(), 4);
        assert_eq!(plan.search_batch_size(), 2);

        let batches: Vec<_> = plan.batches().collect();
        assert_eq!(batches.len(), 2);

        assert_eq!(batches[0].inserts(), 0..2);
        assert_eq!(batches[0].searches(), 0..2);
        assert_eq!(plan.insert_points(&batches[0]), 2..4);
        assert_eq!(plan.insertion_offset(&batches[0]), 4);

        assert_eq!(batches[1].batch, 1);
        assert_eq!(batches[1].inserts(), 2..4);
        assert_eq!(batches[1].searches(), 2..4);
        assert_eq!(plan.insertion_offset(&batches[1]), 6);
    }

    #[test]
    fn searches_outlast_inserts() {
        // ratio = 3: 30 searches for 10 inserts, 6 per batch of 2.
        let plan = WorkloadPlan::new(params(0, 2, 0.25), 10, 5).unwrap();
        assert_eq!(plan.search_total(), 30);
        assert_eq!(plan.search_batch_size(), 6);

        let batches: Vec<_> = plan.batches().collect();
        assert_eq!(batches.len(), 5);
        assert!(batches.iter().all(|b| b.searches().len() == 6));
        assert_eq!(batches.last().unwrap().end_insert, 10);
    }

    #[test]
    fn inserts_outlast_searches() {
        // ratio = 1/3: batch of 9 inserts carries 3 searches, 33 searches overall.
        let plan = WorkloadPlan::new(params(0, 9, 0.75), 100, 5).unwrap();
        assert_eq!(plan.search_total(), 33);
        assert_eq!(plan.search_batch_size(), 3);

        let batches: Vec<_> = plan.batches().collect();
        // 100 inserts in batches of 9.
        assert_eq!(batches.len(), 12);
        let last = batches.last().unwrap();
        assert_eq!(last.inserts(), 99..100);
        assert_eq!(last.searches(), 33..33);
    }

    #[rstest]
    #[case(0.8, 100, 400, 25, 100)]
    #[case(0.9, 90, 900, 10, 100)]
    #[case(0.7, 70, 700, 30, 300)]
    fn whole_products_are_not_truncated(
        #[case] r: f64,
        #[case] batch_size: usize,
        #[case] data_count: usize,
        #[case] search_batch_size: usize,
        #[case] search_total: usize,
    ) {
        let plan = WorkloadPlan::new(params(0, batch_size, r), data_count, 1).unwrap();
        assert_eq!(plan.search_batch_size(), search_batch_size);
        assert_eq!(plan.search_total(), search_total);
    }

    #[test]
    fn pure_insert_workload() {
        let plan = WorkloadPlan::new(params(5, 10, 1.0), 35, 0).unwrap();
        assert_eq!(plan.search_total(), 0);
        assert_eq!(plan.search_batch_size(), 0);
        let batches: Vec<_> = plan.batches().collect();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.searches().is_empty()));
    }

    #[test]
    fn nothing_to_do() {
        let plan = WorkloadPlan::new(params(8, 10, 0.5), 8, 1).unwrap();
        assert_eq!(plan.batches().count(), 0);
    }

    #[rstest]
    #[case(0.0)]
    #[case(-0.5)]
    #[case(1.5)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn invalid_write_ratio(#[case] r: f64) {
        let err = WorkloadPlan::new(params(0, 10, r), 100, 10).unwrap_err();
        assert!(matches!(err, PlanError::InvalidWriteRatio(_)));
    }

    #[test]
    fn invalid_params() {
        assert_eq!(
            WorkloadPlan::new(params(0, 0, 0.5), 10, 10).unwrap_err(),
            PlanError::ZeroBatchSize
        );
        assert_eq!(
            WorkloadPlan::new(params(11, 1, 0.5), 10, 10).unwrap_err(),
            PlanError::BeginExceedsData {
                begin_num: 11,
                data_count: 10
            }
        );
        assert_eq!(
            WorkloadPlan::new(params(0, 2, 0.5), 10, 0).unwrap_err(),
            PlanError::NoQueries { search_total: 10 }
        );
        assert!(matches!(
            WorkloadPlan::new(params(0, 1, 0.6), 10, 10).unwrap_err(),
            PlanError::SearchBatchTooSmall { .. }
        ));

        let mut p = params(0, 2, 0.5);
        p.recall_at = 0;
        assert_eq!(WorkloadPlan::new(p, 10, 10).unwrap_err(), PlanError::ZeroRecallAt);

        // Searching fresh data does not need a query set.
        p.recall_at = 10;
        p.query_new_data = true;
        assert!(WorkloadPlan::new(p, 10, 0).is_ok());
    }

    #[rstest]
    fn realized_ratio_converges(
        #[values(0.1, 0.25, 0.3, 0.5, 0.7, 0.9)] r: f64,
        #[values(10, 64, 100)] batch_size: usize,
    ) {
        let data_count = 10_000;
        let plan = WorkloadPlan::new(params(0, batch_size, r), data_count, 10).unwrap();

        let (mut inserts, mut searches) = (0usize, 0usize);
        let mut last: Option<BatchProgress> = None;
        for b in plan.batches() {
            if let Some(last) = last {
                assert_eq!(b.start_insert, last.end_insert);
                assert_eq!(b.start_search, last.end_search);
            }
            assert!(b.end_insert >= b.start_insert);
            assert!(b.end_search >= b.start_search);
            inserts += b.inserts().len();
            searches += b.searches().len();
            last = Some(b);
        }
        assert_eq!(inserts, plan.insert_total());
        assert_eq!(searches, plan.search_total());

        let expected = (1.0 - r) / r;
        let realized = searches as f64 / inserts as f64;
        assert!(
            (realized - expected).abs() <= 1.0 / inserts as f64,
            "realized {} vs expected {}",
            realized,
            expected
        );
    }
}
