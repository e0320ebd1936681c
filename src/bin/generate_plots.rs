//! Compare persisted benchmark results across databases.
//!
//! Writes `<scale>_performance_summary.txt` into the plots directory and,
//! when built with `--features plots`, the PNG comparison charts.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use searchbench::plots::Comparison;
use searchbench::{Result, Scale};

#[derive(Parser, Debug)]
#[command(name = "generate_plots")]
#[command(about = "Render comparison charts and a summary from benchmark result files")]
struct Args {
    /// Databases to compare (default: $DATABASES or "paradedb elasticsearch")
    databases: Vec<String>,

    #[arg(long, env = "SCALE", default_value = "small")]
    scale: Scale,

    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    #[arg(long, default_value = "plots")]
    plots_dir: PathBuf,
}

fn databases(args: &Args) -> Vec<String> {
    if !args.databases.is_empty() {
        return args.databases.clone();
    }
    std::env::var("DATABASES")
        .unwrap_or_else(|_| "paradedb elasticsearch".to_string())
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn main() -> ExitCode {
    let args = Args::parse();
    searchbench::init_tracing(false);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Plot generation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let databases = databases(args);
    info!("Generating plots for databases: {:?}, scale: {}", databases, args.scale);

    let comparison = Comparison::load(&args.results_dir, args.scale, &databases);
    render(&comparison, args)?;

    let summary = comparison.write_summary(&args.plots_dir)?;
    println!("Summary text saved to: {}", summary.display());
    Ok(())
}

#[cfg(feature = "plots")]
fn render(comparison: &Comparison, args: &Args) -> Result<()> {
    for path in searchbench::plots::render_charts(comparison, &args.plots_dir)? {
        println!("Plot saved to: {}", path.display());
    }
    Ok(())
}

#[cfg(not(feature = "plots"))]
fn render(_comparison: &Comparison, _args: &Args) -> Result<()> {
    info!("Built without the `plots` feature, skipping PNG charts");
    Ok(())
}
