/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! A small brute-force index for unit tests.

use std::{
    collections::HashSet,
    sync::{
        Mutex, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use crate::index::{IndexAdapter, QueryParams, Status, Tag};

#[derive(Debug, Default)]
pub(crate) struct TestIndex {
    points: RwLock<Vec<(Tag, Vec<f32>)>>,
    failing_tags: Mutex<HashSet<Tag>>,
    fail_searches: AtomicBool,
    panic_on_search: AtomicBool,
    params: Mutex<Option<QueryParams>>,
    pub(crate) batch_inserts: AtomicUsize,
    pub(crate) batch_searches: AtomicUsize,
}

impl TestIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.points.read().unwrap().len()
    }

    pub(crate) fn tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self.points.read().unwrap().iter().map(|(t, _)| *t).collect();
        tags.sort_unstable();
        tags
    }

    /// Make inserts of `tag` fail.
    pub(crate) fn fail_tag(&self, tag: Tag) {
        self.failing_tags.lock().unwrap().insert(tag);
    }

    pub(crate) fn fail_searches(&self) {
        self.fail_searches.store(true, Ordering::SeqCst);
    }

    pub(crate) fn panic_on_search(&self) {
        self.panic_on_search.store(true, Ordering::SeqCst);
    }

    pub(crate) fn params(&self) -> Option<QueryParams> {
        *self.params.lock().unwrap()
    }
}

fn distance(a: &[f32], b: &[f32]) -> f32 {
    std::iter::zip(a, b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl IndexAdapter<f32> for TestIndex {
    fn name(&self) -> &str {
        "test"
    }

    fn build(&self, points: &[&[f32]], tags: &[Tag]) -> anyhow::Result<()> {
        anyhow::ensure!(points.len() == tags.len(), "points and tags differ in length");
        let mut guard = self.points.write().unwrap();
        guard.clear();
        guard.extend(std::iter::zip(tags, points).map(|(t, p)| (*t, p.to_vec())));
        Ok(())
    }

    fn insert(&self, point: &[f32], tag: Tag) -> Status {
        if self.failing_tags.lock().unwrap().contains(&tag) {
            return Status::Failure;
        }
        self.points.write().unwrap().push((tag, point.to_vec()));
        Status::Success
    }

    fn batch_insert(&self, points: &[&[f32]], tags: &[Tag]) -> Vec<Status> {
        self.batch_inserts.fetch_add(1, Ordering::SeqCst);
        std::iter::zip(points, tags)
            .map(|(point, tag)| self.insert(point, *tag))
            .collect()
    }

    fn set_query_params(&self, params: &QueryParams) {
        *self.params.lock().unwrap() = Some(*params);
    }

    fn search(&self, query: &[f32], k: usize, _params: &QueryParams, out: &mut Vec<Tag>) -> Status {
        out.clear();
        if self.panic_on_search.load(Ordering::SeqCst) {
            panic!("search exploded");
        }
        if self.fail_searches.load(Ordering::SeqCst) {
            return Status::Failure;
        }

        let guard = self.points.read().unwrap();
        let mut scored: Vec<(f32, Tag)> = guard.iter().map(|(t, p)| (distance(query, p), *t)).collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        out.extend(scored.into_iter().take(k).map(|(_, t)| t));
        Status::Success
    }

    fn batch_search(&self, queries: &[&[f32]], k: usize, params: &QueryParams) -> Vec<Vec<Tag>> {
        self.batch_searches.fetch_add(1, Ordering::SeqCst);
        queries
            .iter()
            .map(|query| {
                let mut out = Vec::new();
                self.search(query, k, params, &mut out);
                out
            })
            .collect()
    }
}
