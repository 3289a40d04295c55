/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Tie-aware recall of collected search results against batched ground truth.
//!
//! Results and ground truth are matched on `(insertion_offset, query_index)`. For each
//! ground truth entry the acceptable set holds its first `recall_at` ids plus any further
//! ids whose distance ties with the `recall_at`-th one, so an index returning either of
//! two equidistant neighbors is not penalized.

use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    collect::{GroundTruthEntry, SearchResult},
    index::Tag,
    io::GroundTruth,
};

/// The divisor used for a single entry's recall.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Normalization {
    /// Divide by the number of distinct tags returned (after truncation to `recall_at`).
    /// An empty result scores zero.
    #[default]
    ReturnedCount,
    /// Divide by `recall_at`.
    RecallAt,
}

impl std::fmt::Display for Normalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReturnedCount => f.write_str("returned-count"),
            Self::RecallAt => f.write_str("recall-at"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecallError {
    #[error("recall_at must be positive")]
    ZeroRecallAt,
    #[error("none of the {results} result entries has a matching ground truth entry")]
    NoMatchedEntries { results: usize },
    #[error("failed to build a thread pool for recall evaluation")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchRecall {
    pub count: usize,
    pub recall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallReport {
    pub recall_at: usize,
    pub normalization: Normalization,
    /// Mean recall over all matched entries.
    pub overall: f64,
    pub matched: usize,
    /// Result entries without ground truth.
    pub skipped: usize,
    /// Mean recall per insertion offset.
    pub per_batch: BTreeMap<usize, BatchRecall>,
}

pub const DEFAULT_TIE_TOLERANCE: f32 = 1e-6;
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Scores [`SearchResult`]s against ground truth.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallEvaluator {
    recall_at: usize,
    normalization: Normalization,
    tie_tolerance: f32,
    parallel_threshold: usize,
    chunk_size: usize,
    num_threads: Option<usize>,
}

type Acceptable = HashMap<(usize, usize), HashSet<Tag>>;

// Partial sums for a contiguous chunk of results.
#[derive(Debug, Default)]
struct Partial {
    sum: f64,
    matched: usize,
    skipped: usize,
    per_batch: BTreeMap<usize, (f64, usize)>,
}

impl Partial {
    fn merge(mut self, other: Partial) -> Self {
        self.sum += other.sum;
        self.matched += other.matched;
        self.skipped += other.skipped;
        for (offset, (sum, count)) in other.per_batch {
            let entry = self.per_batch.entry(offset).or_default();
            entry.0 += sum;
            entry.1 += count;
        }
        self
    }
}

impl RecallEvaluator {
    pub fn new(recall_at: usize) -> Self {
        Self {
            recall_at,
            normalization: Normalization::default(),
            tie_tolerance: DEFAULT_TIE_TOLERANCE,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            num_threads: None,
        }
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Relative tolerance used to decide whether two distances tie. Zero requires exact
    /// equality.
    pub fn with_tie_tolerance(mut self, tolerance: f32) -> Self {
        self.tie_tolerance = tolerance.max(0.0);
        self
    }

    /// Evaluate in parallel once there are at least `threshold` results.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Use a dedicated pool of `num_threads` for parallel evaluation instead of the global
    /// rayon pool.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn recall_at(&self) -> usize {
        self.recall_at
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    fn ties(&self, distance: f32, boundary: f32) -> bool {
        (distance - boundary).abs() <= self.tie_tolerance * boundary.abs().max(1.0)
    }

    /// The ids counted as correct for `entry`: the first `recall_at` ids, extended by the
    /// ids that follow while their distance ties with the `recall_at`-th.
    pub fn acceptable_set(&self, entry: &GroundTruthEntry) -> HashSet<Tag> {
        let tags = entry.tags();
        let k = self.recall_at.min(tags.len());
        let mut end = k;
        if let Some(distances) = entry.distances() {
            if k > 0 {
                let boundary = distances[k - 1];
                while end < tags.len() && self.ties(distances[end], boundary) {
                    end += 1;
                }
            }
        }
        tags[..end].iter().copied().collect()
    }

    /// Recall of a single result list against its acceptable set.
    pub fn score(&self, tags: &[Tag], acceptable: &HashSet<Tag>) -> f64 {
        let mut returned = HashSet::with_capacity(self.recall_at);
        returned.extend(tags.iter().take(self.recall_at).copied());
        let hits = returned.iter().filter(|t| acceptable.contains(t)).count();

        match self.normalization {
            Normalization::ReturnedCount => {
                if returned.is_empty() {
                    0.0
                } else {
                    hits as f64 / returned.len() as f64
                }
            }
            Normalization::RecallAt => hits.min(self.recall_at) as f64 / self.recall_at as f64,
        }
    }

    fn partial(&self, chunk: &[SearchResult], acceptable: &Acceptable) -> Partial {
        let mut partial = Partial::default();
        for result in chunk {
            match acceptable.get(&result.key()) {
                Some(set) => {
                    let recall = self.score(result.tags(), set);
                    partial.sum += recall;
                    partial.matched += 1;
                    let batch = partial
                        .per_batch
                        .entry(result.insertion_offset())
                        .or_default();
                    batch.0 += recall;
                    batch.1 += 1;
                }
                None => {
                    tracing::warn!(
                        offset = result.insertion_offset(),
                        query = result.query_index(),
                        "no ground truth for result entry, skipping"
                    );
                    partial.skipped += 1;
                }
            }
        }
        partial
    }

    /// Score `results` against `groundtruth` entries.
    ///
    /// Results are processed in fixed-size chunks whose partial sums are combined in
    /// order, so the parallel and sequential paths produce identical numbers.
    pub fn evaluate(
        &self,
        results: &[SearchResult],
        groundtruth: &[GroundTruthEntry],
    ) -> Result<RecallReport, RecallError> {
        if self.recall_at == 0 {
            return Err(RecallError::ZeroRecallAt);
        }

        let mut acceptable = Acceptable::with_capacity(groundtruth.len());
        for entry in groundtruth {
            acceptable
                .entry(entry.key())
                .or_insert_with(|| self.acceptable_set(entry));
        }

        let partials: Vec<Partial> = if results.len() >= self.parallel_threshold {
            let run = || -> Vec<Partial> {
                results
                    .par_chunks(self.chunk_size)
                    .map(|chunk| self.partial(chunk, &acceptable))
                    .collect()
            };
            match self.num_threads {
                Some(n) => rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()?
                    .install(run),
                None => run(),
            }
        } else {
            results
                .chunks(self.chunk_size)
                .map(|chunk| self.partial(chunk, &acceptable))
                .collect()
        };

        let total = partials
            .into_iter()
            .fold(Partial::default(), Partial::merge);
        if total.skipped > 0 {
            tracing::warn!(
                skipped = total.skipped,
                "result entries without ground truth were excluded"
            );
        }
        if total.matched == 0 {
            return Err(RecallError::NoMatchedEntries {
                results: results.len(),
            });
        }

        let per_batch = total
            .per_batch
            .into_iter()
            .map(|(offset, (sum, count))| {
                let recall = sum / count as f64;
                (offset, BatchRecall { count, recall })
            })
            .collect();

        Ok(RecallReport {
            recall_at: self.recall_at,
            normalization: self.normalization,
            overall: total.sum / total.matched as f64,
            matched: total.matched,
            skipped: total.skipped,
            per_batch,
        })
    }

    /// Score `results` against a loaded ground truth file.
    pub fn evaluate_groundtruth(
        &self,
        results: &[SearchResult],
        groundtruth: &GroundTruth,
    ) -> Result<RecallReport, RecallError> {
        self.evaluate(results, &groundtruth.entries())
    }
}

///////////
// Tests //
///////////
