/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::path::{Path, PathBuf};

use anyhow::Context;
use ccbench_core::{
    QueryParams, RecallEvaluator,
    recall::{DEFAULT_TIE_TOLERANCE, Normalization},
    scheduler::{Granularity, SchedulerOptions, WorkloadParams},
    stat::RunIdentity,
    utils::PercentileMethod,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{backend::IndexKind, datatype::DataType};

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("the dataset name must not be empty")]
    EmptyDataset,
    #[error("write_ratio must be in (0, 1], got {0}")]
    WriteRatio(f64),
    #[error("batch_size must be positive")]
    ZeroBatchSize,
    #[error("recall_at must be positive")]
    ZeroRecallAt,
    #[error("num_threads must be positive")]
    ZeroThreads,
    #[error("tie_tolerance must be finite and non-negative, got {0}")]
    TieTolerance(f32),
    #[error("query_path is required unless workload.query_new_data is set")]
    NoQueries,
    #[error("{field} \"{}\" either does not exist or is not a file", path.display())]
    MissingFile { field: &'static str, path: PathBuf },
}

/// The vectors driving a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DataConfig {
    /// Name used in reports and result file names.
    pub(crate) dataset: String,
    #[serde(default = "default_data_type")]
    pub(crate) data_type: DataType,
    pub(crate) data_path: PathBuf,
    /// Required unless `workload.query_new_data` is set.
    #[serde(default)]
    pub(crate) query_path: Option<PathBuf>,
    /// Number of leading points used to build the index.
    #[serde(default = "default_begin_num")]
    pub(crate) begin_num: usize,
    #[serde(default = "default_batch_size")]
    pub(crate) batch_size: usize,
}

fn default_data_type() -> DataType {
    DataType::Float32
}

fn default_begin_num() -> usize {
    5000
}

fn default_batch_size() -> usize {
    100
}

/// Index construction parameters. `R` and `Lb` are recorded with the results even when
/// the index kind does not use them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct IndexConfig {
    pub(crate) kind: IndexKind,
    #[serde(rename = "R", alias = "max_degree")]
    pub(crate) max_degree: usize,
    #[serde(rename = "Lb", alias = "build_list")]
    pub(crate) build_list: usize,
    pub(crate) alpha: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::default(),
            max_degree: 16,
            build_list: 50,
            alpha: 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SearchConfig {
    pub(crate) recall_at: usize,
    #[serde(rename = "Ls", alias = "search_list")]
    pub(crate) search_list: usize,
    pub(crate) beam_width: usize,
    pub(crate) alpha: f32,
    /// Zero means unlimited.
    pub(crate) visit_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let params = QueryParams::default();
        Self {
            recall_at: 10,
            search_list: params.search_list,
            beam_width: params.beam_width,
            alpha: params.alpha,
            visit_limit: params.visit_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct WorkloadConfig {
    pub(crate) write_ratio: f64,
    /// Defaults to the available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) num_threads: Option<usize>,
    pub(crate) query_new_data: bool,
    pub(crate) granularity: Granularity,
    pub(crate) seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            write_ratio: 0.5,
            num_threads: None,
            query_new_data: false,
            granularity: Granularity::default(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ResultConfig {
    /// Directory receiving the search results file.
    pub(crate) output_dir: PathBuf,
    /// Ground truth for scoring the run. Recall is skipped without it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) groundtruth: Option<PathBuf>,
    /// CSV log that each run appends one line to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) stat_file: Option<PathBuf>,
    pub(crate) percentile_method: PercentileMethod,
    pub(crate) normalization: Normalization,
    pub(crate) tie_tolerance: f32,
}

impl Default for ResultConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            groundtruth: None,
            stat_file: None,
            percentile_method: PercentileMethod::default(),
            normalization: Normalization::default(),
            tie_tolerance: DEFAULT_TIE_TOLERANCE,
        }
    }
}

/// A complete benchmark run as described by a YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RunConfig {
    pub(crate) data: DataConfig,
    #[serde(default)]
    pub(crate) index: IndexConfig,
    #[serde(default)]
    pub(crate) search: SearchConfig,
    #[serde(default)]
    pub(crate) workload: WorkloadConfig,
    #[serde(default)]
    pub(crate) result: ResultConfig,
}

impl RunConfig {
    /// Parse the file at `path`, resolve its relative paths against the file's directory
    /// and validate it.
    pub(crate) fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("while opening file \"{}\"", path.display()))?;
        let mut config = Self::from_yaml(&text)
            .with_context(|| format!("while parsing \"{}\"", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.resolve(base);
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub(crate) fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Make every relative path relative to `base` instead.
    pub(crate) fn resolve(&mut self, base: &Path) {
        let join = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        join(&mut self.data.data_path);
        join(&mut self.result.output_dir);
        for path in [
            &mut self.data.query_path,
            &mut self.result.groundtruth,
            &mut self.result.stat_file,
        ]
        .into_iter()
        .flatten()
        {
            join(path);
        }
    }

    /// Check everything that can be checked without reading the vector files.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.data.dataset.is_empty() {
            return Err(ConfigError::EmptyDataset);
        }
        let ratio = self.workload.write_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::WriteRatio(ratio));
        }
        if self.data.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.search.recall_at == 0 {
            return Err(ConfigError::ZeroRecallAt);
        }
        if self.workload.num_threads == Some(0) {
            return Err(ConfigError::ZeroThreads);
        }
        let tolerance = self.result.tie_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::TieTolerance(tolerance));
        }

        check_file("data_path", &self.data.data_path)?;
        if !self.workload.query_new_data {
            match &self.data.query_path {
                Some(path) => check_file("query_path", path)?,
                None => return Err(ConfigError::NoQueries),
            }
        }
        if let Some(path) = &self.result.groundtruth {
            check_file("groundtruth", path)?;
        }
        Ok(())
    }

    pub(crate) fn num_threads(&self) -> usize {
        self.workload.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub(crate) fn workload_params(&self) -> WorkloadParams {
        WorkloadParams {
            begin_num: self.data.begin_num,
            batch_size: self.data.batch_size,
            write_ratio: self.workload.write_ratio,
            recall_at: self.search.recall_at,
            query_new_data: self.workload.query_new_data,
        }
    }

    pub(crate) fn query_params(&self) -> QueryParams {
        QueryParams {
            search_list: self.search.search_list,
            beam_width: self.search.beam_width,
            alpha: self.search.alpha,
            visit_limit: self.search.visit_limit,
        }
    }

    pub(crate) fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            num_threads: self.num_threads(),
            granularity: self.workload.granularity,
            query_params: self.query_params(),
            percentile_method: self.result.percentile_method,
            seed: self.workload.seed,
        }
    }

    pub(crate) fn recall_evaluator(&self) -> RecallEvaluator {
        RecallEvaluator::new(self.search.recall_at)
            .with_normalization(self.result.normalization)
            .with_tie_tolerance(self.result.tie_tolerance)
            .with_num_threads(self.num_threads())
    }

    pub(crate) fn identity(&self, index_name: &str) -> RunIdentity {
        RunIdentity {
            index_name: index_name.to_string(),
            dataset_name: self.data.dataset.clone(),
            max_degree: self.index.max_degree,
            build_list: self.index.build_list,
            search_list: self.search.search_list,
            alpha: self.index.alpha,
            num_threads: self.num_threads(),
            batch_size: self.data.batch_size,
            write_ratio: self.workload.write_ratio,
        }
    }

    /// The configuration printed by `ccbench skeleton`.
    pub(crate) fn example() -> Self {
        Self {
            data: DataConfig {
                dataset: "sift".to_string(),
                data_type: DataType::Float32,
                data_path: PathBuf::from("sift_base.fbin"),
                query_path: Some(PathBuf::from("sift_query.fbin")),
                begin_num: default_begin_num(),
                batch_size: default_batch_size(),
            },
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            workload: WorkloadConfig {
                num_threads: Some(8),
                ..WorkloadConfig::default()
            },
            result: ResultConfig {
                groundtruth: Some(PathBuf::from("sift_gt.bin")),
                stat_file: Some(PathBuf::from("results/stats.csv")),
                ..ResultConfig::default()
            },
        }
    }
}

fn check_file(field: &'static str, path: &Path) -> Result<(), ConfigError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConfigError::MissingFile {
            field,
            path: path.to_path_buf(),
        })
    }
}

///////////
// Tests //
///////////
