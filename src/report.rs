//! Result files and console tables.
//!
//! Every file lands in the results directory under the prefix
//! `<scale>_<database>_`. The per-query text files are parsed back by
//! [`crate::plots`], so their line prefixes are stable.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Scale;
use crate::error::Result;
use crate::runner::RunResult;

/// A one-shot pipeline stage with its own timing file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    SchemaSetup,
    DataLoading,
    IndexCreation,
    Analyze,
}

impl Stage {
    pub fn file_name(&self) -> &'static str {
        match self {
            Stage::SchemaSetup => "schema_setup_time.txt",
            Stage::DataLoading => "data_loading_time.txt",
            Stage::IndexCreation => "index_creation_time.txt",
            Stage::Analyze => "analyze_time.txt",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::SchemaSetup => "Schema setup time",
            Stage::DataLoading => "Data loading time",
            Stage::IndexCreation => "Index creation time",
            Stage::Analyze => "Analyze time",
        }
    }
}

/// Wall-clock seconds spent in each setup stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub schema_setup: f64,
    pub data_loading: f64,
    pub index_creation: f64,
    pub analyze: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub average_latency: f64,
    pub total_time: f64,
    pub tps: f64,
    pub failed: usize,
}

impl From<&RunResult> for QueryMetrics {
    fn from(result: &RunResult) -> Self {
        QueryMetrics {
            average_latency: result.average_latency,
            total_time: result.wall_time,
            tps: result.tps,
            failed: result.failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub schema_setup_time: f64,
    pub data_loading_time: f64,
    pub index_creation_time: f64,
    pub analyze_time: f64,
    pub database_size_bytes: Option<u64>,
    /// Keyed `query_<n>`.
    #[serde(flatten)]
    pub queries: BTreeMap<String, QueryMetrics>,
}

/// Contents of `<scale>_<database>_summary.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub database: String,
    pub scale: Scale,
    pub metrics: Metrics,
}

impl Summary {
    pub fn new(
        database: &str,
        scale: Scale,
        stages: &StageTimings,
        database_size_bytes: Option<u64>,
        results: &[RunResult],
    ) -> Self {
        let queries = results
            .iter()
            .map(|r| (format!("query_{}", r.query_id), QueryMetrics::from(r)))
            .collect();

        Summary {
            database: database.to_string(),
            scale,
            metrics: Metrics {
                schema_setup_time: stages.schema_setup,
                data_loading_time: stages.data_loading,
                index_creation_time: stages.index_creation,
                analyze_time: stages.analyze,
                database_size_bytes,
                queries,
            },
        }
    }

    pub fn query(&self, id: u8) -> Option<&QueryMetrics> {
        self.metrics.queries.get(&format!("query_{}", id))
    }
}

/// Writes result files for one (scale, database) pair.
pub struct ResultWriter {
    dir: PathBuf,
    prefix: String,
}

impl ResultWriter {
    /// Creates `dir` if needed.
    pub fn new<P: AsRef<Path>>(dir: P, scale: Scale, database: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(ResultWriter {
            dir,
            prefix: format!("{}_{}_", scale, database),
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.prefix, name))
    }

    pub fn write_query(&self, result: &RunResult) -> Result<PathBuf> {
        let path = self.path(&format!("query{}_time.txt", result.query_id));
        fs::write(&path, query_file_contents(result))?;
        info!("Wrote {}", path.display());
        Ok(path)
    }

    pub fn write_stage(&self, stage: Stage, seconds: f64) -> Result<PathBuf> {
        let path = self.path(stage.file_name());
        fs::write(&path, format!("{}: {:.6}s\n", stage.label(), seconds))?;
        info!("{}: {:.6}s", stage.label(), seconds);
        Ok(path)
    }

    pub fn write_summary(&self, summary: &Summary) -> Result<PathBuf> {
        let path = self.path("summary.json");
        fs::write(&path, serde_json::to_string_pretty(summary)?)?;
        info!("Wrote {}", path.display());
        Ok(path)
    }
}

pub fn query_file_contents(result: &RunResult) -> String {
    format!(
        "Average Latency for Query {id}: {avg:.6}s\nWall time for Query {id}: {wall:.6}s\n",
        id = result.query_id,
        avg = result.average_latency,
        wall = result.wall_time
    )
}

pub fn format_duration(d: Duration) -> String {
    if d.as_micros() < 1000 {
        format!("{}µs", d.as_micros())
    } else if d.as_millis() < 1000 {
        format!("{:.1}ms", d.as_secs_f64() * 1_000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

pub fn format_rate(per_sec: f64) -> String {
    if per_sec >= 1_000.0 {
        format!("{:.1}K/s", per_sec / 1_000.0)
    } else {
        format!("{:.1}/s", per_sec)
    }
}

fn secs(value: f64) -> String {
    format_duration(Duration::from_secs_f64(value.max(0.0)))
}

/// Print the stage and per-query results as box tables.
pub fn print_summary(summary: &Summary, labels: &BTreeMap<u8, String>, results: &[RunResult]) {
    let m = &summary.metrics;
    println!();
    println!("╔══════════════════════════════════════════════════════════════════════════╗");
    println!("║ {:<72} ║", format!("Search Benchmark: {} ({} scale)", summary.database, summary.scale));
    println!("╠══════════════════════════════════════════════════════════════════════════╣");
    println!("║   Schema setup:   {:>12}                                           ║", secs(m.schema_setup_time));
    println!("║   Data loading:   {:>12}                                           ║", secs(m.data_loading_time));
    println!("║   Index creation: {:>12}                                           ║", secs(m.index_creation_time));
    println!("║   Analyze:        {:>12}                                           ║", secs(m.analyze_time));
    match m.database_size_bytes {
        Some(bytes) => println!("║   Size on disk:   {:>9.1} MB                                           ║", bytes as f64 / 1_048_576.0),
        None => println!("║   Size on disk:            N/A                                           ║"),
    }
    println!("╚══════════════════════════════════════════════════════════════════════════╝");

    if results.is_empty() {
        return;
    }

    println!();
    println!("┌───────┬──────────────────────┬────────┬─────────────┬─────────────┬──────────┬────────┐");
    println!("│ Query │ Type                 │ Txns   │ Avg latency │ Wall time   │ TPS      │ Failed │");
    println!("├───────┼──────────────────────┼────────┼─────────────┼─────────────┼──────────┼────────┤");
    for r in results {
        let label = labels.get(&r.query_id).map(String::as_str).unwrap_or("");
        println!(
            "│ {:>5} │ {:<20} │ {:>6} │ {:>11} │ {:>11} │ {:>8} │ {:>6} │",
            r.query_id,
            label,
            r.transactions,
            secs(r.average_latency),
            secs(r.wall_time),
            format_rate(r.tps),
            r.failed
        );
    }
    println!("└───────┴──────────────────────┴────────┴─────────────┴─────────────┴──────────┴────────┘");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunPlan;

    fn result(query_id: u8, transactions: usize) -> RunResult {
        let plan = RunPlan::new(transactions, 1).unwrap();
        let mut r = RunResult::from_workers(query_id, plan, vec![], Duration::from_millis(500));
        r.total_latency = 0.25;
        r.average_latency = if transactions > 0 { 0.25 / transactions as f64 } else { 0.0 };
        r
    }

    #[test]
    fn test_query_file_format() {
        let text = query_file_contents(&result(2, 10));
        assert_eq!(
            text,
            "Average Latency for Query 2: 0.025000s\nWall time for Query 2: 0.500000s\n"
        );
    }

    #[test]
    fn test_writer_prefixes_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path().join("results"), Scale::Medium, "paradedb").unwrap();

        let path = writer.write_stage(Stage::DataLoading, 1.5).unwrap();
        assert!(path.ends_with("medium_paradedb_data_loading_time.txt"));
        assert_eq!(fs::read_to_string(path).unwrap(), "Data loading time: 1.500000s\n");

        let path = writer.write_stage(Stage::Analyze, 0.25).unwrap();
        assert!(path.ends_with("medium_paradedb_analyze_time.txt"));
        assert_eq!(fs::read_to_string(path).unwrap(), "Analyze time: 0.250000s\n");

        let path = writer.write_query(&result(1, 4)).unwrap();
        assert!(path.ends_with("medium_paradedb_query1_time.txt"));
    }

    #[test]
    fn test_summary_json_shape() {
        let stages = StageTimings {
            data_loading: 2.0,
            index_creation: 0.5,
            ..StageTimings::default()
        };
        let summary = Summary::new("elasticsearch", Scale::Small, &stages, Some(4096), &[result(1, 10), result(3, 0)]);

        let json: serde_json::Value = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["database"], "elasticsearch");
        assert_eq!(json["scale"], "small");
        assert_eq!(json["metrics"]["data_loading_time"], 2.0);
        assert_eq!(json["metrics"]["database_size_bytes"], 4096);
        assert_eq!(json["metrics"]["query_1"]["total_time"], 0.5);
        assert_eq!(json["metrics"]["query_3"]["average_latency"], 0.0);
        assert_eq!(json["metrics"]["query_3"]["tps"], 0.0);

        let back: Summary = serde_json::from_value(json).unwrap();
        assert_eq!(back.query(1), summary.query(1));
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_duration(Duration::from_micros(250)), "250µs");
        assert_eq!(format_duration(Duration::from_millis(12)), "12.0ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.50s");
        assert_eq!(format_rate(12.34), "12.3/s");
        assert_eq!(format_rate(2500.0), "2.5K/s");
    }
}
