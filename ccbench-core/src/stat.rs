/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    latency::LatencySummary,
    scheduler::{OperationCounts, RunOutcome},
    utils::fmt::Table,
};

/// Parameters identifying a run in reports and file names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub index_name: String,
    pub dataset_name: String,
    /// Maximum graph degree.
    #[serde(rename = "R")]
    pub max_degree: usize,
    /// Candidate list size used while building.
    #[serde(rename = "Lb")]
    pub build_list: usize,
    /// Candidate list size used while searching.
    #[serde(rename = "Ls")]
    pub search_list: usize,
    pub alpha: f32,
    pub num_threads: usize,
    pub batch_size: usize,
    pub write_ratio: f64,
}

impl RunIdentity {
    /// `<index>_<dataset>_R<R>_Lb<Lb>_Ls<Ls>_w<write ratio>_t<threads>.res`
    pub fn result_file_name(&self) -> String {
        format!(
            "{}_{}_R{}_Lb{}_Ls{}_w{}_t{}.res",
            self.index_name,
            self.dataset_name,
            self.max_degree,
            self.build_list,
            self.search_list,
            self.write_ratio,
            self.num_threads
        )
    }

    pub fn result_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.result_file_name())
    }
}

/// The summary record of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    #[serde(flatten)]
    pub identity: RunIdentity,
    pub num_points: usize,
    pub insert_qps: f64,
    pub insert_latency: LatencySummary,
    pub search_qps: f64,
    pub search_latency: LatencySummary,
    /// `None` when the run was not scored against ground truth.
    pub overall_recall: Option<f64>,
    pub result_path: PathBuf,
    pub counts: OperationCounts,
    pub task_errors: usize,
}

const CSV_HEADER: &str = "index_name,num_points,R,Lb,Ls,alpha,num_threads,dataset_name,\
batch_size,write_ratio,insert_qps,insert_mean_latency,insert_p95_latency,insert_p99_latency,\
search_qps,search_mean_latency,search_p95_latency,search_p99_latency,overall_recall,result_path";

impl Stat {
    pub fn new(
        identity: RunIdentity,
        num_points: usize,
        outcome: &RunOutcome,
        result_path: PathBuf,
    ) -> Self {
        Self {
            identity,
            num_points,
            insert_qps: outcome.insert_qps,
            insert_latency: outcome.insert_latency,
            search_qps: outcome.search_qps,
            search_latency: outcome.search_latency,
            overall_recall: None,
            result_path,
            counts: outcome.counts,
            task_errors: outcome.task_errors.len(),
        }
    }

    fn csv_row(&self) -> String {
        let id = &self.identity;
        let recall = self
            .overall_recall
            .map(|r| r.to_string())
            .unwrap_or_default();
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            id.index_name,
            self.num_points,
            id.max_degree,
            id.build_list,
            id.search_list,
            id.alpha,
            id.num_threads,
            id.dataset_name,
            id.batch_size,
            id.write_ratio,
            self.insert_qps,
            self.insert_latency.mean,
            self.insert_latency.p95,
            self.insert_latency.p99,
            self.search_qps,
            self.search_latency.mean,
            self.search_latency.p95,
            self.search_latency.p99,
            recall,
            self.result_path.display()
        )
    }

    /// Append this record to the CSV log at `path`, writing the header if the file is new.
    pub fn append_csv(&self, path: &Path) -> std::io::Result<()> {
        let exists = path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if !exists {
            writeln!(file, "{}", CSV_HEADER)?;
        }
        writeln!(file, "{}", self.csv_row())
    }
}

impl std::fmt::Display for Stat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id = &self.identity;
        writeln!(
            f,
            "{} on {}: {} points, R = {}, Lb = {}, Ls = {}, alpha = {}",
            id.index_name,
            id.dataset_name,
            self.num_points,
            id.max_degree,
            id.build_list,
            id.search_list,
            id.alpha
        )?;
        writeln!(
            f,
            "threads = {}, batch size = {}, write ratio = {}",
            id.num_threads, id.batch_size, id.write_ratio
        )?;
        writeln!(f)?;

        let mut table = Table::new([
            "Operation", "Count", "Failed", "QPS", "Mean (us)", "P50 (us)", "P95 (us)", "P99 (us)",
            "Max (us)",
        ]);
        let rows = [
            ("insert", self.insert_qps, &self.insert_latency, self.counts.inserts_failed),
            ("search", self.search_qps, &self.search_latency, self.counts.searches_failed),
        ];
        for (name, qps, latency, failed) in rows {
            table.push_row([
                name.to_string(),
                latency.count.to_string(),
                failed.to_string(),
                format!("{:.1}", qps),
                format!("{:.1}", latency.mean),
                format!("{:.1}", latency.p50),
                format!("{:.1}", latency.p95),
                format!("{:.1}", latency.p99),
                format!("{:.1}", latency.max),
            ]);
        }
        write!(f, "{}", table)?;
        writeln!(f)?;

        match self.overall_recall {
            Some(recall) => writeln!(f, "overall recall@k: {:.4}", recall)?,
            None => writeln!(f, "overall recall@k: n/a")?,
        }
        if self.task_errors > 0 {
            writeln!(f, "task errors: {}", self.task_errors)?;
        }
        write!(f, "results: {}", self.result_path.display())
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;

    use crate::utils::MicroSeconds;

    fn identity() -> RunIdentity {
        RunIdentity {
            index_name: "exhaustive".to_string(),
            dataset_name: "sift".to_string(),
            max_degree: 16,
            build_list: 50,
            search_list: 40,
            alpha: 1.2,
            num_threads: 8,
            batch_size: 100,
            write_ratio: 0.5,
        }
    }

    fn outcome() -> RunOutcome {
        RunOutcome {
            results: Vec::new(),
            insert_latency: LatencySummary {
                count: 10,
                mean: 12.5,
                p50: 11.0,
                p95: 20.0,
                p99: 30.0,
                max: 31.0,
            },
            search_latency: LatencySummary::default(),
            insert_qps: 1000.0,
            search_qps: 0.0,
            build_time: MicroSeconds::new(5.0),
            run_time: MicroSeconds::new(10_000.0),
            counts: OperationCounts {
                inserts_succeeded: 9,
                inserts_failed: 1,
                ..OperationCounts::default()
            },
            batches: 1,
            task_errors: Vec::new(),
        }
    }

    #[test]
    fn result_file_name() {
        assert_eq!(
            identity().result_file_name(),
            "exhaustive_sift_R16_Lb50_Ls40_w0.5_t8.res"
        );
        let mut id = identity();
        id.write_ratio = 1.0;
        assert_eq!(
            id.result_path(Path::new("out")),
            Path::new("out").join("exhaustive_sift_R16_Lb50_Ls40_w1_t8.res")
        );
    }

    #[test]
    fn json_uses_report_column_names() {
        let stat = Stat::new(identity(), 1000, &outcome(), PathBuf::from("out/x.res"));
        let value = serde_json::to_value(&stat).unwrap();
        assert_eq!(value["R"], 16);
        assert_eq!(value["Lb"], 50);
        assert_eq!(value["Ls"], 40);
        assert_eq!(value["index_name"], "exhaustive");
        assert_eq!(value["insert_latency"]["p95"], 20.0);
        assert!(value["overall_recall"].is_null());

        let back: Stat = serde_json::from_value(value).unwrap();
        assert_eq!(back, stat);
    }

    #[test]
    fn csv_log_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.csv");
        let mut stat = Stat::new(identity(), 1000, &outcome(), PathBuf::from("x.res"));
        stat.append_csv(&path).unwrap();
        stat.overall_recall = Some(0.875);
        stat.append_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[0].split(',').count(),
            lines[1].split(',').count()
        );
        assert!(lines[1].starts_with("exhaustive,1000,16,50,40,1.2,8,sift,100,0.5,1000,12.5,20,30,"));
        assert!(lines[2].ends_with(",0.875,x.res"));
    }

    #[test]
    fn display() {
        let mut stat = Stat::new(identity(), 1000, &outcome(), PathBuf::from("x.res"));
        let text = stat.to_string();
        assert!(text.contains("exhaustive on sift"));
        assert!(text.contains("overall recall@k: n/a"));
        assert!(!text.contains("task errors"));

        stat.overall_recall = Some(0.5);
        stat.task_errors = 2;
        let text = stat.to_string();
        assert!(text.contains("overall recall@k: 0.5000"));
        assert!(text.contains("task errors: 2"));
    }
}
