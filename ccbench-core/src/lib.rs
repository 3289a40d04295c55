/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! A concurrent benchmark harness for approximate nearest neighbor indexes.
//!
//! The harness drives an index implementing [`index::IndexAdapter`] through a mixed
//! insert/search workload on a [`pool::WorkerPool`]. Insert and search operations are
//! interleaved at a fixed write ratio by the [`scheduler::WorkloadScheduler`], their
//! latencies are gathered by a [`latency::LatencyRecorder`] and every search result is
//! tagged with the insertion offset it observed by the [`collect::ResultCollector`].
//!
//! Once a run completes, [`recall::RecallEvaluator`] scores the collected results against
//! a batched ground truth file, allowing ties at the recall boundary.

pub mod collect;
pub mod index;
pub mod io;
pub mod latency;
pub mod pool;
pub mod recall;
pub mod scheduler;
pub mod stat;
pub mod utils;

pub use collect::{ResultCollector, SearchResult};
pub use index::{IndexAdapter, QueryParams, Status, Tag};
pub use latency::{LatencyRecorder, LatencySummary, OperationKind};
pub use pool::WorkerPool;
pub use recall::{RecallEvaluator, RecallReport};
pub use scheduler::{WorkloadPlan, WorkloadScheduler};

#[cfg(test)]
pub(crate) mod test_index;
