//! Cross-database comparison from persisted result files.
//!
//! Reads the `<scale>_<db>_*` text files written by [`crate::report`] (plus an
//! optional `startup_time.txt` left by the orchestrator) and produces a text
//! summary. With the `plots` feature the same data is rendered as PNG charts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::catalog::{QueryCatalog, MAX_QUERY_ID};
use crate::config::Scale;
use crate::error::Result;

/// Query types always listed in the summary, data or not.
const BASELINE_QUERIES: [u8; 3] = [1, 2, 3];

/// Average latency and wall time read from one `query<n>_time.txt`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QueryTimes {
    pub average: Option<f64>,
    pub total: Option<f64>,
}

/// The number after the first `:` of a result line, with a trailing `s` removed.
pub fn parse_seconds(line: &str) -> Option<f64> {
    let value = line.split(':').nth(1)?.trim();
    value.trim_end_matches('s').trim().parse().ok()
}

fn read_lines(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!("No result file {}: {}", path.display(), e);
            None
        }
    }
}

fn find_value<F: Fn(&str) -> bool>(path: &Path, matches: F) -> Option<f64> {
    let text = read_lines(path)?;
    text.lines()
        .map(str::trim)
        .find(|line| matches(line))
        .and_then(parse_seconds)
}

pub fn parse_startup_file(path: &Path) -> Option<f64> {
    find_value(path, |line| line.starts_with("Startup time"))
}

pub fn parse_data_loading_file(path: &Path) -> Option<f64> {
    find_value(path, |line| line.contains("Data loading") && line.contains("time"))
}

pub fn parse_index_creation_file(path: &Path) -> Option<f64> {
    find_value(path, |line| line.contains("Index creation") && line.contains("time"))
}

/// `None` when the file is missing or holds neither line.
pub fn parse_query_file(path: &Path) -> Option<QueryTimes> {
    let text = read_lines(path)?;
    let mut times = QueryTimes::default();
    for line in text.lines().map(str::trim) {
        if line.starts_with("Average time") || line.starts_with("Average Latency") {
            times.average = parse_seconds(line);
        } else if line.starts_with("Wall time") {
            times.total = parse_seconds(line);
        }
    }
    if times.average.is_none() && times.total.is_none() {
        None
    } else {
        Some(times)
    }
}

/// Capitalise each word: `paradedb` → `Paradedb`.
pub fn display_name(db: &str) -> String {
    let mut out = String::with_capacity(db.len());
    let mut start = true;
    for c in db.chars() {
        if c.is_alphabetic() {
            if start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start = false;
        } else {
            out.push(c);
            start = true;
        }
    }
    out
}

/// Everything found on disk for one database.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatabaseResults {
    pub name: String,
    pub startup: Option<f64>,
    pub data_loading: Option<f64>,
    pub index_creation: Option<f64>,
    pub queries: BTreeMap<u8, QueryTimes>,
}

impl DatabaseResults {
    pub fn load(results_dir: &Path, scale: Scale, db: &str) -> Self {
        let file = |name: &str| results_dir.join(format!("{}_{}_{}", scale, db, name));

        let queries = (1..=MAX_QUERY_ID)
            .filter_map(|id| parse_query_file(&file(&format!("query{}_time.txt", id))).map(|t| (id, t)))
            .collect();

        DatabaseResults {
            name: db.to_string(),
            startup: parse_startup_file(&file("startup_time.txt")),
            data_loading: parse_data_loading_file(&file("data_loading_time.txt")),
            index_creation: parse_index_creation_file(&file("index_creation_time.txt")),
            queries,
        }
    }

    pub fn display_name(&self) -> String {
        display_name(&self.name)
    }

    /// Loading plus index creation; either part may be missing.
    pub fn loading_and_indexing(&self) -> Option<f64> {
        match (self.data_loading, self.index_creation) {
            (None, None) => None,
            (loading, index) => Some(loading.unwrap_or(0.0) + index.unwrap_or(0.0)),
        }
    }

    pub fn average(&self, id: u8) -> Option<f64> {
        self.queries.get(&id).and_then(|t| t.average)
    }

    /// `1 / average`, defined only for a positive average.
    pub fn tps(&self, id: u8) -> Option<f64> {
        self.average(id).filter(|&avg| avg > 0.0).map(|avg| 1.0 / avg)
    }

    /// Sum of wall times over every query file.
    pub fn total_query_time(&self) -> f64 {
        self.queries.values().filter_map(|t| t.total).sum()
    }

    pub fn average_tps(&self, ids: &[u8]) -> Option<f64> {
        let values: Vec<f64> = ids.iter().filter_map(|&id| self.tps(id)).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

/// Results of several databases at one scale.
#[derive(Clone, Debug)]
pub struct Comparison {
    pub scale: Scale,
    pub databases: Vec<DatabaseResults>,
    labels: BTreeMap<u8, String>,
}

impl Comparison {
    pub fn load<S: AsRef<str>>(results_dir: &Path, scale: Scale, databases: &[S]) -> Self {
        let databases = databases
            .iter()
            .map(|db| DatabaseResults::load(results_dir, scale, db.as_ref()))
            .collect();
        let catalog = QueryCatalog::default();
        let labels = catalog
            .ids()
            .filter_map(|id| catalog.get(id).ok().map(|s| (id, s.name.clone())))
            .collect();

        Comparison { scale, databases, labels }
    }

    /// The baseline query types plus any other type some database has data for.
    pub fn query_ids(&self) -> Vec<u8> {
        let mut ids: BTreeSet<u8> = BASELINE_QUERIES.into_iter().collect();
        for db in &self.databases {
            ids.extend(db.queries.keys().copied());
        }
        ids.into_iter().collect()
    }

    pub fn label(&self, id: u8) -> String {
        self.labels
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("Query {}", id))
    }

    pub fn summary_text(&self) -> String {
        let ids = self.query_ids();
        let mut out = String::from("# Performance Comparison Summary\n\n");

        out.push_str("Startup Times:\n");
        for db in &self.databases {
            line(&mut out, db, db.startup.map(|v| format!("{:.2}s", v)));
        }
        out.push('\n');

        out.push_str("Data Loading & Indexing Times:\n");
        for db in &self.databases {
            line(&mut out, db, db.loading_and_indexing().map(|v| format!("{:.2}s", v)));
        }
        out.push('\n');

        for &id in &ids {
            let _ = writeln!(out, "Query {}: {}", id, self.label(id));
            for db in &self.databases {
                let value = db.average(id).map(|avg| match db.tps(id) {
                    Some(tps) => format!("{:.4}s ({:.2} TPS)", avg, tps),
                    None => format!("{:.4}s", avg),
                });
                line(&mut out, db, value);
            }
            out.push('\n');
        }

        out.push_str("Total Test Duration:\n");
        for db in &self.databases {
            let total = db.total_query_time();
            line(&mut out, db, (total > 0.0).then(|| format!("{:.4}s", total)));
        }
        out.push('\n');

        out.push_str("TPS Summary (Average across queries):\n");
        for db in &self.databases {
            line(&mut out, db, db.average_tps(&ids).map(|v| format!("{:.2} TPS", v)));
        }
        out.push('\n');

        out
    }

    pub fn write_summary(&self, plots_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(plots_dir)?;
        let path = plots_dir.join(format!("{}_performance_summary.txt", self.scale));
        fs::write(&path, self.summary_text())?;
        Ok(path)
    }
}

fn line(out: &mut String, db: &DatabaseResults, value: Option<String>) {
    let _ = writeln!(
        out,
        "  {}: {}",
        db.display_name(),
        value.unwrap_or_else(|| "N/A".to_string())
    );
}

#[cfg(feature = "plots")]
pub use charts::render_charts;

#[cfg(feature = "plots")]
mod charts {
    use std::error::Error;
    use std::path::{Path, PathBuf};

    use plotters::coord::Shift;
    use plotters::prelude::*;

    use super::Comparison;
    use crate::error::{BenchError, Result};

    type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;
    type DrawResult = std::result::Result<(), Box<dyn Error>>;

    const COLORS: [RGBColor; 5] = [
        RGBColor(0x1f, 0x77, 0xb4),
        RGBColor(0xff, 0x7f, 0x0e),
        RGBColor(0x2c, 0xa0, 0x2c),
        RGBColor(0xd6, 0x27, 0x28),
        RGBColor(0x94, 0x67, 0xbd),
    ];

    fn color(i: usize) -> RGBColor {
        COLORS[i % COLORS.len()]
    }

    /// Render the grid and both aggregated charts; returns the written paths.
    pub fn render_charts(comparison: &Comparison, plots_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(plots_dir)?;
        let scale = comparison.scale;
        let grid = plots_dir.join(format!("{}_performance_comparison.png", scale));
        let time = plots_dir.join(format!("{}_aggregated_performance_time.png", scale));
        let tps = plots_dir.join(format!("{}_aggregated_performance_tps.png", scale));

        draw_grid(comparison, &grid).map_err(plot_error)?;
        draw_grouped(comparison, &time, "Aggregated Performance by Query Type - Time", "Time (seconds)", |db, id| {
            db.average(id)
        })
        .map_err(plot_error)?;
        draw_grouped(comparison, &tps, "Aggregated Performance by Query Type - TPS", "Transactions Per Second", |db, id| {
            db.tps(id)
        })
        .map_err(plot_error)?;

        Ok(vec![grid, time, tps])
    }

    fn plot_error(e: Box<dyn Error>) -> BenchError {
        BenchError::Plot(e.to_string())
    }

    fn draw_grid(comparison: &Comparison, path: &Path) -> DrawResult {
        let ids = comparison.query_ids();
        let query_rows = ids.len().div_ceil(3);
        let rows = 1 + 2 * query_rows;

        let root = BitMapBackend::new(path, (2000, 400 * rows as u32)).into_drawing_area();
        root.fill(&WHITE)?;
        let root = root.titled(
            "ParadeDB vs Elasticsearch Performance Comparison (Setup & Query Times)",
            ("sans-serif", 28).into_font(),
        )?;
        let areas = root.split_evenly((rows, 3));

        let dbs = &comparison.databases;
        let startup: Vec<_> = dbs.iter().filter_map(|d| d.startup.map(|v| (d.display_name(), v))).collect();
        let loading: Vec<_> = dbs
            .iter()
            .filter_map(|d| d.loading_and_indexing().map(|v| (d.display_name(), v)))
            .collect();
        let totals: Vec<_> = dbs
            .iter()
            .map(|d| (d.display_name(), d.total_query_time()))
            .filter(|(_, v)| *v > 0.0)
            .collect();

        bar_chart(&areas[0], "Startup Time (seconds)", "Time (s)", &startup, 2)?;
        bar_chart(&areas[1], "Data Loading & Indexing Time (seconds)", "Time (s)", &loading, 2)?;
        bar_chart(&areas[2], "Total Query Duration", "Time (seconds)", &totals, 4)?;

        for (n, &id) in ids.iter().enumerate() {
            let label = comparison.label(id);
            let times: Vec<_> = dbs.iter().filter_map(|d| d.average(id).map(|v| (d.display_name(), v))).collect();
            let tps: Vec<_> = dbs.iter().filter_map(|d| d.tps(id).map(|v| (d.display_name(), v))).collect();

            let time_slot = 3 + (n / 3) * 6 + n % 3;
            let tps_slot = time_slot + 3;
            bar_chart(&areas[time_slot], &format!("{} - Query {} Time", label, id), "Time (seconds)", &times, 4)?;
            bar_chart(&areas[tps_slot], &format!("{} - Query {} TPS", label, id), "Transactions Per Second", &tps, 2)?;
        }

        root.present()?;
        Ok(())
    }

    fn bar_chart(area: &Area<'_>, title: &str, y_desc: &str, bars: &[(String, f64)], precision: usize) -> DrawResult {
        if bars.is_empty() {
            let area = area.titled(title, ("sans-serif", 18).into_font())?;
            let (w, h) = area.dim_in_pixel();
            area.draw(&Text::new(
                "No data available",
                (w as i32 / 2 - 60, h as i32 / 2),
                ("sans-serif", 16).into_font().color(&RGBColor(0x80, 0x80, 0x80)),
            ))?;
            return Ok(());
        }

        let max = bars.iter().map(|(_, v)| *v).fold(0.0, f64::max).max(f64::EPSILON);
        let mut chart = ChartBuilder::on(area)
            .caption(title, ("sans-serif", 18).into_font())
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d((0..bars.len()).into_segmented(), 0.0..max * 1.15)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .y_desc(y_desc)
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) => bars.get(*i).map(|(name, _)| name.clone()).unwrap_or_default(),
                _ => String::new(),
            })
            .draw()?;

        chart.draw_series(bars.iter().enumerate().map(|(i, (_, v))| {
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *v)],
                color(i).mix(0.7).filled(),
            );
            bar.set_margin(0, 0, 10, 10);
            bar
        }))?;

        chart.draw_series(bars.iter().enumerate().map(|(i, (_, v))| {
            Text::new(
                format!("{:.*}", precision, v),
                (SegmentValue::CenterOf(i), *v + max * 0.02),
                ("sans-serif", 14).into_font(),
            )
        }))?;
        Ok(())
    }

    fn draw_grouped<F>(comparison: &Comparison, path: &Path, title: &str, y_desc: &str, value: F) -> DrawResult
    where
        F: Fn(&super::DatabaseResults, u8) -> Option<f64>,
    {
        let ids = comparison.query_ids();
        let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
        root.fill(&WHITE)?;

        let max = comparison
            .databases
            .iter()
            .flat_map(|db| ids.iter().filter_map(|&id| value(db, id)))
            .fold(0.0, f64::max);
        if max <= 0.0 {
            bar_chart(&root, title, y_desc, &[], 2)?;
            root.present()?;
            return Ok(());
        }

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22).into_font())
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d((0..ids.len()).into_segmented(), 0.0..max * 1.15)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc("Query Type")
            .y_desc(y_desc)
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) => ids.get(*i).map(|&id| comparison.label(id)).unwrap_or_default(),
                _ => String::new(),
            })
            .draw()?;

        let (width, _) = chart.plotting_area().dim_in_pixel();
        let segment = width as f64 / ids.len() as f64;
        let bar_width = segment * 0.8 / comparison.databases.len().max(1) as f64;

        for (j, db) in comparison.databases.iter().enumerate() {
            let left = (segment * 0.1 + j as f64 * bar_width) as u32;
            let right = (segment - segment * 0.1 - (j + 1) as f64 * bar_width).max(0.0) as u32;
            let fill = color(j);

            chart
                .draw_series(ids.iter().enumerate().filter_map(|(i, &id)| {
                    value(db, id).map(|v| {
                        let mut bar = Rectangle::new(
                            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), v)],
                            fill.mix(0.7).filled(),
                        );
                        bar.set_margin(0, 0, left, right);
                        bar
                    })
                }))?
                .label(db.display_name())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], fill.mix(0.7).filled()));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        root.present()?;
        Ok(())
    }
}
