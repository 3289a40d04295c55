/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::ops::Range;

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// Where search queries are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySource {
    /// The held-out query set.
    Queries,
    /// The data set itself.
    Data,
}

/// Chooses the query issued for each search slot.
///
/// Both modes share the scheduler's slot arithmetic; only the query index differs.
#[derive(Debug)]
pub(crate) enum QuerySelector {
    /// Cycle through a query set of `count` entries. The cursor is advanced before it is
    /// read, so the first pass starts at index 1 and visits index 0 last.
    Circular { count: usize, cursor: usize },
    /// Draw from a seeded shuffle of the points inserted by the current batch, wrapping
    /// when a batch has more searches than inserts. A batch without inserts keeps the
    /// previous batch's points.
    FreshData {
        rng: StdRng,
        order: Vec<usize>,
        position: usize,
    },
}

impl QuerySelector {
    pub(crate) fn circular(count: usize) -> Self {
        Self::Circular { count, cursor: 0 }
    }

    pub(crate) fn fresh_data(seed: u64) -> Self {
        Self::FreshData {
            rng: StdRng::seed_from_u64(seed),
            order: Vec::new(),
            position: 0,
        }
    }

    pub(crate) fn source(&self) -> QuerySource {
        match self {
            Self::Circular { .. } => QuerySource::Queries,
            Self::FreshData { .. } => QuerySource::Data,
        }
    }

    /// Notify the selector of the data points inserted by the upcoming batch.
    pub(crate) fn begin_batch(&mut self, inserted: Range<usize>) {
        if let Self::FreshData {
            rng,
            order,
            position,
        } = self
        {
            if !inserted.is_empty() {
                order.clear();
                order.extend(inserted);
                order.shuffle(rng);
                *position = 0;
            }
        }
    }

    pub(crate) fn next_query(&mut self) -> Option<usize> {
        match self {
            Self::Circular { count, cursor } => {
                if *count == 0 {
                    return None;
                }
                *cursor += 1;
                if *cursor >= *count {
                    *cursor %= *count;
                }
                Some(*cursor)
            }
            Self::FreshData {
                order, position, ..
            } => {
                if order.is_empty() {
                    return None;
                }
                let index = order[*position % order.len()];
                *position += 1;
                Some(index)
            }
        }
    }

    pub(crate) fn cursor(&self) -> usize {
        match self {
            Self::Circular { cursor, .. } => *cursor,
            Self::FreshData { position, .. } => *position,
        }
    }
}

///////////
// Tests //
///////////
