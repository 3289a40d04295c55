/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Interleaving of insert and search operations over a [`crate::pool::WorkerPool`].
//!
//! A run proceeds as follows:
//!
//! 1. The index is built synchronously from the first `begin_num` data points, tagged
//!    `0..begin_num`.
//! 2. Each batch submits its inserts (data points `begin_num + start_insert` up to
//!    `begin_num + end_insert`, tagged with their data index) followed by its searches.
//!    Every search result is tagged with the insertion offset `begin_num + end_insert`.
//! 3. The pool is drained before the next batch starts, so batch boundaries are the only
//!    points at which the index state is known.
//! 4. Once both quotas are exhausted the pool is shut down and statistics are computed.

mod counters;
mod plan;
mod query;
mod run;

use serde::{Deserialize, Serialize};

pub use counters::{OperationCounters, OperationCounts};
pub use plan::{BatchProgress, Batches, PlanError, WorkloadParams, WorkloadPlan};
pub use query::QuerySource;
pub use run::{BatchReport, RunOutcome};

use crate::{index::QueryParams, utils::PercentileMethod};

/// How operations are packaged into pool tasks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One task (and one latency sample) per insert or search.
    #[default]
    Operation,
    /// One task per batch of inserts and one per batch of searches, using the index's
    /// batched entry points. Each task contributes a single latency sample.
    Batch,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operation => f.write_str("operation"),
            Self::Batch => f.write_str("batch"),
        }
    }
}

/// Execution settings for a [`WorkloadScheduler`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    pub num_threads: usize,
    pub granularity: Granularity,
    pub query_params: QueryParams,
    pub percentile_method: PercentileMethod,
    /// Seed for the shuffle used when searching freshly inserted data.
    pub seed: u64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            num_threads: 1,
            granularity: Granularity::default(),
            query_params: QueryParams::default(),
            percentile_method: PercentileMethod::default(),
            seed: 0,
        }
    }
}

/// Drives a [`WorkloadPlan`] against an index.
#[derive(Debug, Clone)]
pub struct WorkloadScheduler {
    plan: WorkloadPlan,
    options: SchedulerOptions,
}

impl WorkloadScheduler {
    pub fn new(plan: WorkloadPlan, options: SchedulerOptions) -> Self {
        Self { plan, options }
    }

    pub fn plan(&self) -> &WorkloadPlan {
        &self.plan
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }
}
