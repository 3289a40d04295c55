/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::{collections::BTreeMap, io::Write, path::Path, sync::Arc};

use anyhow::Context;
use ccbench_core::{
    RecallEvaluator, RecallReport, SearchResult, WorkloadPlan, WorkloadScheduler,
    io::{self, GroundTruth, Metadata, VectorSet},
    recall::RecallError,
    stat::Stat,
    utils::fmt::Table,
};

use crate::{
    config::RunConfig,
    datatype::{DataType, Element, Visitor},
    output::Output,
};

// Read the header of a vector file and check the file holds exactly that many elements of
// `data_type`.
fn probe(path: &Path, data_type: DataType) -> anyhow::Result<Metadata> {
    let metadata = io::read_metadata(path)
        .with_context(|| format!("while reading the header of \"{}\"", path.display()))?;
    let actual = std::fs::metadata(path)
        .with_context(|| format!("while inspecting \"{}\"", path.display()))?
        .len();
    let expected = (metadata.npoints as u64)
        .checked_mul(metadata.dim as u64)
        .and_then(|n| n.checked_mul(data_type.element_size() as u64))
        .and_then(|n| n.checked_add(8));
    anyhow::ensure!(
        expected == Some(actual),
        "\"{}\" is {} bytes, which does not match {} {}-dimensional {} vectors",
        path.display(),
        actual,
        metadata.npoints,
        metadata.dim,
        data_type
    );
    Ok(metadata)
}

/// Size the workload from the headers of the configured vector files.
pub(crate) fn plan(config: &RunConfig) -> anyhow::Result<WorkloadPlan> {
    let data_type = config.data.data_type;
    let data = probe(&config.data.data_path, data_type)?;

    let query_count = match (&config.data.query_path, config.workload.query_new_data) {
        (Some(path), false) => {
            let queries = probe(path, data_type)?;
            anyhow::ensure!(
                queries.dim == data.dim,
                "query dimension {} does not match data dimension {}",
                queries.dim,
                data.dim
            );
            queries.npoints
        }
        _ => 0,
    };

    Ok(WorkloadPlan::new(
        config.workload_params(),
        data.npoints,
        query_count,
    )?)
}

/// Load the data, drive the workload and write every configured output.
pub(crate) fn run(
    config: &RunConfig,
    plan: WorkloadPlan,
    output: &mut dyn Output,
) -> anyhow::Result<Stat> {
    config.data.data_type.dispatch(Run {
        config,
        plan,
        output,
    })
}

struct Run<'a> {
    config: &'a RunConfig,
    plan: WorkloadPlan,
    output: &'a mut dyn Output,
}

impl Visitor for Run<'_> {
    type Output = anyhow::Result<Stat>;

    fn visit<T: Element>(self) -> Self::Output {
        run_typed::<T>(self.config, self.plan, self.output)
    }
}

fn load<T: Element>(path: &Path) -> anyhow::Result<VectorSet<T>> {
    VectorSet::load_file(path).with_context(|| format!("while loading \"{}\"", path.display()))
}

fn run_typed<T: Element>(
    config: &RunConfig,
    plan: WorkloadPlan,
    mut output: &mut dyn Output,
) -> anyhow::Result<Stat> {
    let data = load::<T>(&config.data.data_path)?;
    let dim = data.dim();
    let queries = match (&config.data.query_path, config.workload.query_new_data) {
        (Some(path), false) => load::<T>(path)?,
        _ => VectorSet::from_rows(dim, std::iter::empty::<&[T]>()),
    };
    tracing::info!(
        data = data.len(),
        queries = queries.len(),
        dim,
        data_type = %T::DATA_TYPE,
        "loaded vectors"
    );

    let index = config.index.kind.create::<T>(dim)?;
    let identity = config.identity(index.name());
    let scheduler = WorkloadScheduler::new(plan, config.scheduler_options());

    let progress = output.batch_progress(plan.batches().count())?;
    let outcome = scheduler.run_with(index, Arc::new(data), Arc::new(queries), |report| {
        progress.set_message(format!("offset {}", report.insertion_offset));
        progress.inc(1);
    })?;
    progress.finish_and_clear();

    let output_dir = &config.result.output_dir;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("while creating \"{}\"", output_dir.display()))?;
    let result_path = identity.result_path(output_dir);
    io::write_results_file(&result_path, &outcome.results)
        .with_context(|| format!("while writing \"{}\"", result_path.display()))?;
    tracing::info!(
        path = %result_path.display(),
        results = outcome.results.len(),
        "wrote search results"
    );

    let mut stat = Stat::new(identity, plan.data_count(), &outcome, result_path);
    if let Some(path) = &config.result.groundtruth {
        let groundtruth = GroundTruth::load_file(path)
            .with_context(|| format!("while loading ground truth \"{}\"", path.display()))?;
        let report = score(&config.recall_evaluator(), &outcome.results, &groundtruth)?;
        write_recall(output, &report)?;
        stat.overall_recall = Some(report.overall);
    }

    writeln!(output)?;
    writeln!(output, "{}", stat)?;

    if let Some(path) = &config.result.stat_file {
        stat.append_csv(path)
            .with_context(|| format!("while appending to \"{}\"", path.display()))?;
    }
    Ok(stat)
}

/// Evaluate `results`, reporting zero recall when nothing matches the ground truth.
pub(crate) fn score(
    evaluator: &RecallEvaluator,
    results: &[SearchResult],
    groundtruth: &GroundTruth,
) -> anyhow::Result<RecallReport> {
    match evaluator.evaluate_groundtruth(results, groundtruth) {
        Ok(report) => Ok(report),
        Err(err @ RecallError::NoMatchedEntries { .. }) => {
            tracing::warn!(%err, "reporting zero recall");
            Ok(RecallReport {
                recall_at: evaluator.recall_at(),
                normalization: evaluator.normalization(),
                overall: 0.0,
                matched: 0,
                skipped: results.len(),
                per_batch: BTreeMap::new(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn write_recall(
    mut output: &mut dyn Output,
    report: &RecallReport,
) -> anyhow::Result<()> {
    if !report.per_batch.is_empty() {
        let mut table = Table::new(["Offset", "Results", "Recall"]);
        for (offset, batch) in &report.per_batch {
            table.push_row([
                offset.to_string(),
                batch.count.to_string(),
                format!("{:.4}", batch.recall),
            ]);
        }
        writeln!(output, "{}", table)?;
    }
    writeln!(
        output,
        "recall@{} ({}): {:.4} over {} results",
        report.recall_at, report.normalization, report.overall, report.matched
    )?;
    if report.skipped > 0 {
        writeln!(
            output,
            "{} results had no ground truth entry and were skipped",
            report.skipped
        )?;
    }
    Ok(())
}

///////////
// Tests //
///////////
