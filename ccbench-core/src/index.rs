/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! The boundary between the harness and the index under test.

use serde::{Deserialize, Serialize};

/// Stable external identifier attached to an indexed point.
pub type Tag = u32;

/// Outcome of a single index operation.
///
/// A `Failure` is an expected, countable result (e.g. a rejected insert) and is never
/// fatal to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<bool> for Status {
    fn from(ok: bool) -> Self {
        if ok { Self::Success } else { Self::Failure }
    }
}

/// Search-time tuning knobs forwarded to the index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    /// Size of the search candidate list (`Ls`, also known as `ef_search`).
    pub search_list: usize,
    pub beam_width: usize,
    pub alpha: f32,
    /// Maximum number of visited nodes. Zero means unbounded.
    pub visit_limit: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            search_list: 50,
            beam_width: 1,
            alpha: 1.2,
            visit_limit: 0,
        }
    }
}

/// An ANN index driven by the benchmark harness.
///
/// Operations are issued concurrently from many worker threads, so implementations are
/// responsible for their own synchronization. All methods take `&self`.
pub trait IndexAdapter<T>: Send + Sync {
    /// A short name used in reports and result file names.
    fn name(&self) -> &str;

    /// Build the index from an initial point set. Called once before any other operation.
    fn build(&self, points: &[&[T]], tags: &[Tag]) -> anyhow::Result<()>;

    fn insert(&self, point: &[T], tag: Tag) -> Status;

    /// Insert several points at once, returning one status per point in order.
    ///
    /// The provided implementation inserts each point in turn.
    fn batch_insert(&self, points: &[&[T]], tags: &[Tag]) -> Vec<Status> {
        std::iter::zip(points, tags)
            .map(|(point, tag)| self.insert(point, *tag))
            .collect()
    }

    /// Configure the parameters subsequent searches should use.
    ///
    /// The provided implementation does nothing.
    fn set_query_params(&self, _params: &QueryParams) {}

    /// Find the `k` nearest neighbors of `query`, writing their tags to `out`.
    ///
    /// `out` is cleared first. On success it holds at most `k` tags, closest first.
    fn search(&self, query: &[T], k: usize, params: &QueryParams, out: &mut Vec<Tag>) -> Status;

    /// Search several queries at once. Failed searches yield an empty list.
    fn batch_search(&self, queries: &[&[T]], k: usize, params: &QueryParams) -> Vec<Vec<Tag>> {
        queries
            .iter()
            .map(|query| {
                let mut out = Vec::with_capacity(k);
                match self.search(query, k, params, &mut out) {
                    Status::Success => out,
                    Status::Failure => Vec::new(),
                }
            })
            .collect()
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_index::TestIndex;

    #[test]
    fn status_from_bool() {
        assert_eq!(Status::from(true), Status::Success);
        assert!(!Status::from(false).is_success());
    }

    #[test]
    fn query_params_defaults() {
        let params: QueryParams = serde_json::from_str(r#"{"search_list": 100}"#).unwrap();
        assert_eq!(params.search_list, 100);
        assert_eq!(params.beam_width, 1);
        assert_eq!(params.visit_limit, 0);
    }

    #[test]
    fn provided_batch_methods() {
        let index = TestIndex::new();
        index.build(&[&[0.0][..], &[10.0][..]], &[0, 1]).unwrap();

        let points: [&[f32]; 3] = [&[1.0], &[2.0], &[3.0]];
        assert_eq!(
            index.batch_insert(&points, &[2, 3, 4]),
            vec![Status::Success; 3]
        );
        assert_eq!(index.len(), 5);

        index.fail_tag(9);
        assert_eq!(
            index.batch_insert(&[&[4.0][..], &[5.0][..]], &[9, 10]),
            vec![Status::Failure, Status::Success]
        );
        // The non-failing insert still went through.
        assert_eq!(index.len(), 6);

        let results = index.batch_search(&[&[0.4][..], &[9.0][..]], 2, &QueryParams::default());
        assert_eq!(results, vec![vec![0, 2], vec![1, 10]]);
    }
}
