/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::{collections::HashSet, sync::RwLock};

use ccbench_core::{IndexAdapter, QueryParams, Status, Tag};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::datatype::Element;

#[derive(Debug)]
struct Store<T> {
    tags: Vec<Tag>,
    // Row-major, `dim` elements per tag.
    data: Vec<T>,
    present: HashSet<Tag>,
}

impl<T: Element> Store<T> {
    fn new() -> Self {
        Self {
            tags: Vec::new(),
            data: Vec::new(),
            present: HashSet::new(),
        }
    }

    fn push(&mut self, point: &[T], tag: Tag) -> bool {
        if !self.present.insert(tag) {
            return false;
        }
        self.tags.push(tag);
        self.data.extend_from_slice(point);
        true
    }

    fn rows(&self, dim: usize) -> impl Iterator<Item = (Tag, &[T])> {
        std::iter::zip(self.tags.iter().copied(), self.data.chunks_exact(dim))
    }
}

/// A flat index answering every search with a full scan.
///
/// Readers share the store while writers take it exclusively, so searches observe either
/// all or none of a concurrent insert. Results are exact, which makes this backend the
/// reference point for recall measurements.
#[derive(Debug)]
pub struct Exhaustive<T> {
    dim: usize,
    store: RwLock<Store<T>>,
}

impl<T: Element> Exhaustive<T> {
    pub fn new(dim: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(dim > 0, "the exhaustive index needs a positive dimension");
        Ok(Self {
            dim,
            store: RwLock::new(Store::new()),
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.store.read().map(|s| s.tags.len()).unwrap_or(0)
    }
}

fn squared_l2<T: Element>(a: &[T], b: &[T]) -> f32 {
    std::iter::zip(a, b)
        .map(|(x, y)| {
            let d = (*x).into() - (*y).into();
            d * d
        })
        .sum()
}

// Keep the `k` closest candidates in ascending order, breaking ties by tag.
fn nearest(scored: &mut Vec<(f32, Tag)>, k: usize) {
    let cmp = |a: &(f32, Tag), b: &(f32, Tag)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
    if scored.len() > k {
        scored.select_nth_unstable_by(k, cmp);
        scored.truncate(k);
    }
    scored.sort_unstable_by(cmp);
}

impl<T: Element> IndexAdapter<T> for Exhaustive<T> {
    fn name(&self) -> &str {
        "exhaustive"
    }

    fn build(&self, points: &[&[T]], tags: &[Tag]) -> anyhow::Result<()> {
        anyhow::ensure!(
            points.len() == tags.len(),
            "got {} points but {} tags",
            points.len(),
            tags.len()
        );
        let mut store = self
            .store
            .write()
            .map_err(|_| anyhow::anyhow!("the exhaustive index lock is poisoned"))?;
        for (i, (point, tag)) in std::iter::zip(points, tags).enumerate() {
            anyhow::ensure!(
                point.len() == self.dim,
                "point {} has dimension {}, expected {}",
                i,
                point.len(),
                self.dim
            );
            anyhow::ensure!(store.push(point, *tag), "duplicate tag {}", tag);
        }
        tracing::debug!(points = points.len(), "built exhaustive index");
        Ok(())
    }

    fn insert(&self, point: &[T], tag: Tag) -> Status {
        if point.len() != self.dim {
            return Status::Failure;
        }
        match self.store.write() {
            Ok(mut store) => store.push(point, tag).into(),
            Err(_) => Status::Failure,
        }
    }

    fn batch_insert(&self, points: &[&[T]], tags: &[Tag]) -> Vec<Status> {
        let failed = vec![Status::Failure; points.len()];
        if points.len() != tags.len() {
            return failed;
        }
        let Ok(mut store) = self.store.write() else {
            return failed;
        };
        std::iter::zip(points, tags)
            .map(|(point, tag)| {
                if point.len() != self.dim {
                    return Status::Failure;
                }
                store.push(point, *tag).into()
            })
            .collect()
    }

    fn set_query_params(&self, params: &QueryParams) {
        if params.visit_limit != 0 {
            tracing::info!(
                visit_limit = params.visit_limit,
                "exhaustive searches will only scan the oldest points"
            );
        }
    }

    /// A non-zero `visit_limit` restricts the scan to the oldest `visit_limit` points.
    fn search(&self, query: &[T], k: usize, params: &QueryParams, out: &mut Vec<Tag>) -> Status {
        out.clear();
        if query.len() != self.dim {
            return Status::Failure;
        }
        let Ok(store) = self.store.read() else {
            return Status::Failure;
        };
        let limit = match params.visit_limit {
            0 => store.tags.len(),
            n => n,
        };
        let mut scored: Vec<(f32, Tag)> = store
            .rows(self.dim)
            .take(limit)
            .map(|(tag, row)| (squared_l2(query, row), tag))
            .collect();
        drop(store);

        nearest(&mut scored, k);
        out.extend(scored.into_iter().map(|(_, tag)| tag));
        Status::Success
    }

    fn batch_search(&self, queries: &[&[T]], k: usize, params: &QueryParams) -> Vec<Vec<Tag>> {
        queries
            .par_iter()
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
