/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::sync::Mutex;

use thiserror::Error;

use crate::{index::Tag, pool::lock};

#[derive(Debug, Error)]
#[error("result has {tags} tags but {distances} distances")]
pub struct ShapeMismatch {
    pub tags: usize,
    pub distances: usize,
}

/// The neighbors returned for one query, tagged with the insertion offset the index had
/// reached when the query ran.
///
/// Ground truth entries share this shape, see [`GroundTruthEntry`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    insertion_offset: usize,
    query_index: usize,
    tags: Vec<Tag>,
    distances: Option<Vec<f32>>,
}

/// An authoritative neighbor list for one `(insertion_offset, query_index)` pair.
pub type GroundTruthEntry = SearchResult;

impl SearchResult {
    pub fn new(insertion_offset: usize, query_index: usize, tags: Vec<Tag>) -> Self {
        Self {
            insertion_offset,
            query_index,
            tags,
            distances: None,
        }
    }

    /// Construct a result carrying one distance per tag.
    pub fn with_distances(
        insertion_offset: usize,
        query_index: usize,
        tags: Vec<Tag>,
        distances: Vec<f32>,
    ) -> Result<Self, ShapeMismatch> {
        if tags.len() != distances.len() {
            return Err(ShapeMismatch {
                tags: tags.len(),
                distances: distances.len(),
            });
        }
        Ok(Self {
            insertion_offset,
            query_index,
            tags,
            distances: Some(distances),
        })
    }

    pub fn insertion_offset(&self) -> usize {
        self.insertion_offset
    }

    pub fn query_index(&self) -> usize {
        self.query_index
    }

    pub fn key(&self) -> (usize, usize) {
        (self.insertion_offset, self.query_index)
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn distances(&self) -> Option<&[f32]> {
        self.distances.as_deref()
    }
}

/// Thread-safe, append-only accumulator of [`SearchResult`]s.
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: Mutex<Vec<SearchResult>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: SearchResult) {
        lock(&self.results).push(result);
    }

    pub fn len(&self) -> usize {
        lock(&self.results).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every collected result, stably sorted by insertion offset.
    ///
    /// Results sharing an offset keep their arrival order. The collector is left empty.
    pub fn finish(&self) -> Vec<SearchResult> {
        let mut results = std::mem::take(&mut *lock(&self.results));
        results.sort_by_key(SearchResult::insertion_offset);
        results
    }
}

///////////
// Tests //
///////////
