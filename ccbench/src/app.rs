/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::{io::Write, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use ccbench_core::{
    RecallEvaluator,
    io::{self, GroundTruth},
    recall::{DEFAULT_TIE_TOLERANCE, Normalization},
    utils::fmt::Banner,
};

use crate::{bench, config::RunConfig, output::Output};

/// How a single result's recall is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Normalize {
    /// Divide by the number of tags the search returned.
    Returned,
    /// Divide by `recall_at`.
    RecallAt,
}

impl From<Normalize> for Normalization {
    fn from(value: Normalize) -> Self {
        match value {
            Normalize::Returned => Normalization::ReturnedCount,
            Normalize::RecallAt => Normalization::RecallAt,
        }
    }
}

/// Parsed command line options.
#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Print an example run configuration.
    Skeleton,
    /// Run the benchmark described by a YAML configuration file.
    Run {
        /// The configuration file to run.
        #[arg(long)]
        config: PathBuf,
        /// Also write the run statistics as JSON to this file.
        #[arg(long = "output-file")]
        output_file: Option<PathBuf>,
        /// Parse the configuration and check the input files, but don't run the benchmark.
        #[arg(long, action)]
        dry_run: bool,
    },
    /// Score a saved results file against ground truth.
    CheckRecall {
        /// Results written by a previous run.
        #[arg(long)]
        results: PathBuf,
        /// Ground truth with one batch per insertion offset.
        #[arg(long)]
        groundtruth: PathBuf,
        #[arg(long)]
        recall_at: usize,
        #[arg(long, value_enum, default_value_t = Normalize::Returned)]
        normalize: Normalize,
        /// Threads used for evaluation. Defaults to the global rayon pool.
        #[arg(long)]
        threads: Option<usize>,
        /// Relative tolerance for distance ties at the `recall_at` boundary.
        #[arg(long, default_value_t = DEFAULT_TIE_TOLERANCE)]
        tie_tolerance: f32,
    },
}

/// Concurrent insert and search benchmarks for nearest neighbor indexes.
#[derive(Debug, Parser)]
#[command(version)]
pub(crate) struct App {
    #[command(subcommand)]
    command: Commands,
}

impl App {
    /// Construct [`Self`] by parsing the process arguments.
    pub(crate) fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    #[cfg(test)]
    fn try_parse_from<I, T>(itr: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(<Self as clap::Parser>::try_parse_from(itr)?)
    }

    pub(crate) fn run(&self, mut output: &mut dyn Output) -> anyhow::Result<()> {
        match &self.command {
            Commands::Skeleton => {
                writeln!(output, "Skeleton configuration:")?;
                writeln!(output, "{}", RunConfig::example().to_yaml()?)?;
            }
            Commands::Run {
                config,
                output_file,
                dry_run,
            } => {
                let config = RunConfig::load(config)?;
                let plan = bench::plan(&config)?;

                let title = format!("{} on {}", config.index.kind, config.data.dataset);
                writeln!(output, "{}", Banner::new(&title))?;
                writeln!(
                    output,
                    "{} points: {} to build, {} inserts and {} searches in {} batches",
                    plan.data_count(),
                    plan.begin_num(),
                    plan.insert_total(),
                    plan.search_total(),
                    plan.batches().count()
                )?;

                if *dry_run {
                    writeln!(
                        output,
                        "Success - skipping the run because \"--dry-run\" was used."
                    )?;
                    return Ok(());
                }

                let stat = bench::run(&config, plan, output)?;
                if let Some(path) = output_file {
                    let json = serde_json::to_string_pretty(&stat)?;
                    std::fs::write(path, json)
                        .with_context(|| format!("while writing \"{}\"", path.display()))?;
                }
                if stat.task_errors > 0 {
                    anyhow::bail!(
                        "{} tasks failed during the run; see the log for details",
                        stat.task_errors
                    );
                }
            }
            Commands::CheckRecall {
                results,
                groundtruth,
                recall_at,
                normalize,
                threads,
                tie_tolerance,
            } => {
                let results = io::read_results_file(results)
                    .with_context(|| format!("while reading \"{}\"", results.display()))?;
                let groundtruth = GroundTruth::load_file(groundtruth)
                    .with_context(|| format!("while reading \"{}\"", groundtruth.display()))?;

                let mut evaluator = RecallEvaluator::new(*recall_at)
                    .with_normalization((*normalize).into())
                    .with_tie_tolerance(*tie_tolerance);
                if let Some(threads) = threads {
                    anyhow::ensure!(*threads > 0, "--threads must be positive");
                    evaluator = evaluator.with_num_threads(*threads);
                }

                let report = bench::score(&evaluator, &results, &groundtruth)?;
                bench::write_recall(output, &report)?;
            }
        }
        Ok(())
    }
}

///////////
// Tests //
///////////
