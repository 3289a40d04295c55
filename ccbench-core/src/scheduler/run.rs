/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::{ops::Range, sync::Arc, time::Instant};

use anyhow::Context as _;

use super::{
    BatchProgress, Granularity, OperationCounters, OperationCounts, WorkloadScheduler,
    query::{QuerySelector, QuerySource},
};
use crate::{
    collect::{ResultCollector, SearchResult},
    index::{IndexAdapter, QueryParams, Status, Tag},
    io::VectorSet,
    latency::{LatencyRecorder, LatencySummary, OperationKind},
    pool::{TaskError, WorkerPool},
    timed,
    utils::MicroSeconds,
};

/// Passed to the batch callback of [`WorkloadScheduler::run_with`] once every task of a
/// batch has finished.
#[derive(Debug, Clone, Copy)]
pub struct BatchReport {
    pub progress: BatchProgress,
    /// The insertion offset attached to this batch's search results.
    pub insertion_offset: usize,
    pub total_batches: usize,
    /// Wall clock time from the first submission of the batch until it drained.
    pub elapsed: MicroSeconds,
}

/// Everything measured during a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Search results, sorted by insertion offset.
    pub results: Vec<SearchResult>,
    pub insert_latency: LatencySummary,
    pub search_latency: LatencySummary,
    /// Inserts issued per second of mixed-phase wall time.
    pub insert_qps: f64,
    /// Searches issued per second of mixed-phase wall time.
    pub search_qps: f64,
    pub build_time: MicroSeconds,
    pub run_time: MicroSeconds,
    pub counts: OperationCounts,
    pub batches: usize,
    /// Errors and panics captured from individual tasks. A run with task errors still
    /// completes; deciding whether that is fatal is up to the caller.
    pub task_errors: Vec<TaskError>,
}

/// State shared by every task of a run.
struct Context<T, I: ?Sized> {
    index: Arc<I>,
    data: Arc<VectorSet<T>>,
    search_source: Arc<VectorSet<T>>,
    params: QueryParams,
    recall_at: usize,
    latencies: LatencyRecorder,
    collector: ResultCollector,
    counters: OperationCounters,
}

impl<T, I> Context<T, I>
where
    T: bytemuck::Pod,
    I: IndexAdapter<T> + ?Sized,
{
    fn insert(&self, id: usize) {
        let point = self.data.row(id);
        let (elapsed, status) = timed!(self.index.insert(point, id as Tag));
        self.latencies.record(OperationKind::Insert, elapsed);
        self.counters.record(OperationKind::Insert, status, 1);
    }

    fn search(&self, query_index: usize, insertion_offset: usize) {
        let query = self.search_source.row(query_index);
        let mut tags = Vec::with_capacity(self.recall_at);
        let (elapsed, status) =
            timed!(self.index.search(query, self.recall_at, &self.params, &mut tags));
        self.latencies.record(OperationKind::Search, elapsed);
        self.counters.record(OperationKind::Search, status, 1);
        if status.is_success() {
            self.collector
                .push(SearchResult::new(insertion_offset, query_index, tags));
        }
    }

    fn insert_batch(&self, ids: Range<usize>) {
        let points: Vec<&[T]> = ids.clone().map(|i| self.data.row(i)).collect();
        let tags: Vec<Tag> = ids.map(|i| i as Tag).collect();
        let (elapsed, statuses) = timed!(self.index.batch_insert(&points, &tags));
        self.latencies.record(OperationKind::Insert, elapsed);
        // Points without a status of their own count as failed.
        let succeeded = statuses
            .iter()
            .take(points.len())
            .filter(|s| s.is_success())
            .count();
        self.counters
            .record(OperationKind::Insert, Status::Success, succeeded);
        self.counters
            .record(OperationKind::Insert, Status::Failure, points.len() - succeeded);
    }

    /// Empty result lists count as failed searches and are not collected.
    fn search_batch(&self, query_indices: &[usize], insertion_offset: usize) -> anyhow::Result<()> {
        let queries: Vec<&[T]> = query_indices
            .iter()
            .map(|&q| self.search_source.row(q))
            .collect();
        let (elapsed, results) =
            timed!(self.index.batch_search(&queries, self.recall_at, &self.params));
        self.latencies.record(OperationKind::Search, elapsed);

        anyhow::ensure!(
            results.len() == queries.len(),
            "batch search returned {} result lists for {} queries",
            results.len(),
            queries.len()
        );
        for (&query_index, tags) in std::iter::zip(query_indices, results) {
            if tags.is_empty() {
                self.counters
                    .record(OperationKind::Search, Status::Failure, 1);
            } else {
                self.counters
                    .record(OperationKind::Search, Status::Success, 1);
                self.collector
                    .push(SearchResult::new(insertion_offset, query_index, tags));
            }
        }
        Ok(())
    }
}

impl WorkloadScheduler {
    /// Run the workload without a batch callback. See [`Self::run_with`].
    pub fn run<T, I>(
        &self,
        index: Arc<I>,
        data: Arc<VectorSet<T>>,
        queries: Arc<VectorSet<T>>,
    ) -> anyhow::Result<RunOutcome>
    where
        T: bytemuck::Pod + Send + Sync,
        I: IndexAdapter<T> + ?Sized + 'static,
    {
        self.run_with(index, data, queries, |_| {})
    }

    /// Build `index` and drive the mixed workload against it, invoking `on_batch` after
    /// each batch has drained.
    ///
    /// `queries` is ignored when the workload searches freshly inserted data.
    ///
    /// Returns an error if the inputs do not match the plan, the build fails or the worker
    /// pool cannot be started. Failures inside individual tasks do not abort the run and
    /// are reported in [`RunOutcome::task_errors`].
    pub fn run_with<T, I, F>(
        &self,
        index: Arc<I>,
        data: Arc<VectorSet<T>>,
        queries: Arc<VectorSet<T>>,
        mut on_batch: F,
    ) -> anyhow::Result<RunOutcome>
    where
        T: bytemuck::Pod + Send + Sync,
        I: IndexAdapter<T> + ?Sized + 'static,
        F: FnMut(&BatchReport),
    {
        let plan = &self.plan;
        let options = &self.options;

        anyhow::ensure!(
            data.len() == plan.data_count(),
            "the workload was planned for {} data points but {} were provided",
            plan.data_count(),
            data.len()
        );
        anyhow::ensure!(
            data.len() as u64 <= u64::from(Tag::MAX) + 1,
            "{} data points cannot be tagged with 32-bit tags",
            data.len()
        );

        let mut selector = if plan.params().query_new_data {
            QuerySelector::fresh_data(options.seed)
        } else {
            QuerySelector::circular(queries.len())
        };
        let search_source = match selector.source() {
            QuerySource::Queries => {
                if plan.search_total() > 0 {
                    anyhow::ensure!(
                        queries.dim() == data.dim(),
                        "query dimension {} does not match data dimension {}",
                        queries.dim(),
                        data.dim()
                    );
                }
                queries
            }
            QuerySource::Data => data.clone(),
        };

        // Build phase.
        let begin = plan.begin_num();
        tracing::info!(index = index.name(), points = begin, "building index");
        let build_time = {
            let points: Vec<&[T]> = data.rows().take(begin).collect();
            let tags: Vec<Tag> = (0..begin).map(|i| i as Tag).collect();
            let (elapsed, built) = timed!(index.build(&points, &tags));
            built.with_context(|| {
                format!(
                    "failed to build the \"{}\" index from {} points",
                    index.name(),
                    begin
                )
            })?;
            elapsed
        };
        tracing::info!(elapsed = %build_time, "index built");

        index.set_query_params(&options.query_params);

        let ctx = Arc::new(Context {
            index,
            data,
            search_source,
            params: options.query_params,
            recall_at: plan.params().recall_at,
            latencies: LatencyRecorder::new(),
            collector: ResultCollector::new(),
            counters: OperationCounters::new(),
        });
        let pool = WorkerPool::new(options.num_threads).context("failed to start the worker pool")?;

        let total_batches = plan.batches().count();
        tracing::info!(
            insert_total = plan.insert_total(),
            search_total = plan.search_total(),
            search_batch_size = plan.search_batch_size(),
            batches = total_batches,
            threads = options.num_threads,
            granularity = %options.granularity,
            "starting mixed workload"
        );

        let start = Instant::now();
        for mut progress in plan.batches() {
            let batch_start = Instant::now();
            let inserted = plan.insert_points(&progress);
            let offset = plan.insertion_offset(&progress);

            match options.granularity {
                Granularity::Operation => {
                    for id in inserted.clone() {
                        let ctx = ctx.clone();
                        pool.submit(format!("insert of point {}", id), move || {
                            ctx.insert(id);
                            Ok(())
                        })?;
                    }
                }
                Granularity::Batch => {
                    if !inserted.is_empty() {
                        let ctx = ctx.clone();
                        let ids = inserted.clone();
                        pool.submit(
                            format!("batch insert of points {}..{}", ids.start, ids.end),
                            move || {
                                ctx.insert_batch(ids);
                                Ok(())
                            },
                        )?;
                    }
                }
            }

            selector.begin_batch(inserted);
            let query_indices = progress
                .searches()
                .map(|_| selector.next_query())
                .collect::<Option<Vec<usize>>>()
                .context("no queries are available for searching")?;
            progress.query_cursor = selector.cursor();

            match options.granularity {
                Granularity::Operation => {
                    for query_index in query_indices {
                        let ctx = ctx.clone();
                        pool.submit(
                            format!("search of query {} at offset {}", query_index, offset),
                            move || {
                                ctx.search(query_index, offset);
                                Ok(())
                            },
                        )?;
                    }
                }
                Granularity::Batch => {
                    if !query_indices.is_empty() {
                        let ctx = ctx.clone();
                        pool.submit(
                            format!(
                                "batch search of {} queries at offset {}",
                                query_indices.len(),
                                offset
                            ),
                            move || ctx.search_batch(&query_indices, offset),
                        )?;
                    }
                }
            }

            pool.await_idle();

            let report = BatchReport {
                progress,
                insertion_offset: offset,
                total_batches,
                elapsed: batch_start.elapsed().into(),
            };
            tracing::debug!(
                batch = progress.batch,
                inserts = progress.inserts().len(),
                searches = progress.searches().len(),
                offset,
                elapsed = %report.elapsed,
                "batch complete"
            );
            on_batch(&report);
        }
        let run_time: MicroSeconds = start.elapsed().into();

        pool.shutdown();
        let task_errors = pool.take_errors();
        if !task_errors.is_empty() {
            tracing::warn!(count = task_errors.len(), "tasks failed during the run");
        }

        let seconds = run_time.as_seconds();
        let qps = |n: usize| if seconds > 0.0 { n as f64 / seconds } else { 0.0 };
        let method = options.percentile_method;

        let outcome = RunOutcome {
            results: ctx.collector.finish(),
            insert_latency: ctx.latencies.summary(OperationKind::Insert, method),
            search_latency: ctx.latencies.summary(OperationKind::Search, method),
            insert_qps: qps(plan.insert_total()),
            search_qps: qps(plan.search_total()),
            build_time,
            run_time,
            counts: ctx.counters.snapshot(),
            batches: total_batches,
            task_errors,
        };

        tracing::info!(
            elapsed = %outcome.run_time,
            insert_qps = outcome.insert_qps,
            search_qps = outcome.search_qps,
            results = outcome.results.len(),
            "mixed workload complete"
        );
        Ok(outcome)
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        scheduler::{SchedulerOptions, WorkloadParams, WorkloadPlan},
        test_index::TestIndex,
    };

    // A one dimensional data set where point `i` sits at coordinate `i`.
    fn line(n: usize) -> Arc<VectorSet<f32>> {
        let values: Vec<f32> = (0..n).map(|i| i as f32).collect();
        Arc::new(VectorSet::from_rows(1, values.chunks(1)))
    }

    fn scheduler(
        begin_num: usize,
        batch_size: usize,
        write_ratio: f64,
        recall_at: usize,
        data_count: usize,
        query_count: usize,
        options: SchedulerOptions,
    ) -> WorkloadScheduler {
        let params = WorkloadParams {
            begin_num,
            batch_size,
            write_ratio,
            recall_at,
            query_new_data: false,
        };
        let plan = WorkloadPlan::new(params, data_count, query_count).unwrap();
        WorkloadScheduler::new(plan, options)
    }

    #[test]
    fn small_workload_end_to_end() {
        let options = SchedulerOptions {
            num_threads: 3,
            ..SchedulerOptions::default()
        };
        // Both queries coincide with points of the initial build, so their nearest
        // neighbor does not depend on how inserts and searches interleave.
        let scheduler = scheduler(2, 2, 0.5, 1, 6, 2, options);
        let index = Arc::new(TestIndex::new());

        let mut reports = Vec::new();
        let outcome = scheduler
            .run_with(index.clone(), line(6), line(2), |r| reports.push(*r))
            .unwrap();

        assert_eq!(index.tags(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(index.params(), Some(QueryParams::default()));

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].insertion_offset, 4);
        assert_eq!(reports[0].progress.inserts().len(), 2);
        assert_eq!(reports[0].progress.searches().len(), 2);
        assert_eq!(reports[0].progress.query_cursor, 0);
        assert_eq!(reports[1].insertion_offset, 6);
        assert_eq!(reports[1].progress.query_cursor, 0);
        assert!(reports.iter().all(|r| r.total_batches == 2));

        assert_eq!(outcome.results.len(), 4);
        assert!(outcome.results.iter().all(|r| r.tags().len() == 1));
        let keys: Vec<_> = outcome.results.iter().map(|r| r.insertion_offset()).collect();
        assert_eq!(keys, vec![4, 4, 6, 6]);

        let mut queries: Vec<_> = outcome.results.iter().map(SearchResult::key).collect();
        queries.sort();
        assert_eq!(queries, vec![(4, 0), (4, 1), (6, 0), (6, 1)]);
        for r in &outcome.results {
            assert_eq!(r.tags(), &[r.query_index() as Tag]);
        }

        assert_eq!(outcome.insert_latency.count, 4);
        assert_eq!(outcome.search_latency.count, 4);
        assert_eq!(
            outcome.counts,
            OperationCounts {
                inserts_succeeded: 4,
                inserts_failed: 0,
                searches_succeeded: 4,
                searches_failed: 0,
            }
        );
        assert_eq!(outcome.batches, 2);
        assert!(outcome.task_errors.is_empty());
    }

    #[test]
    fn failures_are_counted_not_fatal() {
        let scheduler = scheduler(2, 2, 0.5, 1, 6, 3, SchedulerOptions::default());
        let index = Arc::new(TestIndex::new());
        index.fail_tag(3);
        index.fail_searches();

        let outcome = scheduler.run(index.clone(), line(6), line(3)).unwrap();
        assert_eq!(index.tags(), vec![0, 1, 2, 4, 5]);
        assert_eq!(outcome.counts.inserts_failed, 1);
        assert_eq!(outcome.counts.inserts_succeeded, 3);
        assert_eq!(outcome.counts.searches_failed, 4);
        // Failed searches are timed but produce no results.
        assert_eq!(outcome.search_latency.count, 4);
        assert!(outcome.results.is_empty());
        assert!(outcome.task_errors.is_empty());
    }

    #[test]
    fn task_panics_are_captured() {
        let scheduler = scheduler(2, 2, 0.5, 1, 6, 3, SchedulerOptions::default());
        let index = Arc::new(TestIndex::new());
        index.panic_on_search();

        let outcome = scheduler.run(index.clone(), line(6), line(3)).unwrap();
        assert_eq!(outcome.task_errors.len(), 4);
        assert!(
            outcome
                .task_errors
                .iter()
                .all(|e| e.context.starts_with("search of query"))
        );
        assert_eq!(outcome.counts.inserts_succeeded, 4);
    }

    #[test]
    fn batch_granularity() {
        let options = SchedulerOptions {
            num_threads: 2,
            granularity: Granularity::Batch,
            ..SchedulerOptions::default()
        };
        let scheduler = scheduler(4, 4, 0.5, 2, 16, 4, options);
        let index = Arc::new(TestIndex::new());

        let outcome = scheduler.run(index.clone(), line(16), line(4)).unwrap();
        assert_eq!(index.len(), 16);
        assert_eq!(
            index
                .batch_inserts
                .load(std::sync::atomic::Ordering::SeqCst),
            3
        );
        assert_eq!(
            index
                .batch_searches
                .load(std::sync::atomic::Ordering::SeqCst),
            3
        );
        // One latency sample per batch task.
        assert_eq!(outcome.insert_latency.count, 3);
        assert_eq!(outcome.search_latency.count, 3);
        assert_eq!(outcome.results.len(), 12);
        assert!(outcome.results.iter().all(|r| r.tags().len() == 2));
        assert_eq!(outcome.counts.searches_succeeded, 12);
    }

    #[test]
    fn batch_inserts_count_each_point() {
        let options = SchedulerOptions {
            num_threads: 2,
            granularity: Granularity::Batch,
            ..SchedulerOptions::default()
        };
        let scheduler = scheduler(4, 4, 1.0, 1, 16, 0, options);
        let index = Arc::new(TestIndex::new());
        index.fail_tag(5);

        let empty = Arc::new(VectorSet::<f32>::from_rows(1, std::iter::empty()));
        let outcome = scheduler.run(index.clone(), line(16), empty).unwrap();
        assert_eq!(index.len(), 15);
        assert_eq!(
            index
                .batch_inserts
                .load(std::sync::atomic::Ordering::SeqCst),
            3
        );
        assert_eq!(
            outcome.counts,
            OperationCounts {
                inserts_succeeded: 11,
                inserts_failed: 1,
                searches_succeeded: 0,
                searches_failed: 0,
            }
        );
    }

    #[test]
    fn fresh_data_queries() {
        let params = WorkloadParams {
            begin_num: 2,
            batch_size: 2,
            write_ratio: 0.5,
            recall_at: 1,
            query_new_data: true,
        };
        let plan = WorkloadPlan::new(params, 8, 0).unwrap();
        let scheduler = WorkloadScheduler::new(
            plan,
            // A single worker runs tasks in submission order, so each batch's inserts
            // complete before its searches start.
            SchedulerOptions {
                num_threads: 1,
                seed: 42,
                ..SchedulerOptions::default()
            },
        );
        let empty = Arc::new(VectorSet::<f32>::from_rows(1, std::iter::empty()));
        let outcome = scheduler
            .run(Arc::new(TestIndex::new()), line(8), empty)
            .unwrap();

        assert_eq!(outcome.results.len(), 6);
        for r in &outcome.results {
            // Each query is a point inserted by the batch that searched for it.
            let offset = r.insertion_offset();
            assert!((offset - 2..offset).contains(&r.query_index()));
            assert_eq!(r.tags(), &[r.query_index() as Tag]);
        }
    }

    #[test]
    fn mismatched_inputs() {
        let scheduler = scheduler(2, 2, 0.5, 1, 6, 3, SchedulerOptions::default());
        let err = scheduler
            .run(Arc::new(TestIndex::new()), line(5), line(3))
            .unwrap_err();
        assert!(err.to_string().contains("planned for 6 data points"));

        let wide = Arc::new(VectorSet::from_rows(2, [&[0.0f32, 1.0][..]]));
        let err = scheduler
            .run(Arc::new(TestIndex::new()), line(6), wide)
            .unwrap_err();
        assert!(err.to_string().contains("query dimension 2"));
    }
}
