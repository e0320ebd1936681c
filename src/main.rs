//! searchbench - benchmark one search backend end to end.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use searchbench::pipeline::DEFAULT_BATCH_SIZE;
use searchbench::{
    run_all, BenchmarkConfig, Elasticsearch, ElasticsearchConfig, ParadeDb, ParadeDbConfig, Result,
    RetryPolicy, RunOptions, RunPlan, Scale, SearchBackend,
};

/// Full-text search benchmark: ParadeDB vs Elasticsearch
#[derive(Parser, Debug)]
#[command(name = "searchbench")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    target: Target,
}

#[derive(Subcommand, Debug)]
enum Target {
    /// Benchmark ParadeDB (Postgres + pg_search)
    Paradedb(ParadeDbArgs),
    /// Benchmark Elasticsearch
    Elasticsearch(ElasticsearchArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Dataset scale: small, medium or large
    #[arg(long, env = "SCALE", default_value = "small")]
    scale: Scale,

    /// Queries issued per query type
    #[arg(long, env = "TRANSACTIONS", default_value_t = 10)]
    transactions: usize,

    /// Number of concurrent workers
    #[arg(long, env = "CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Connections in the pool (defaults to --concurrency)
    #[arg(long)]
    pool_size: Option<usize>,

    /// Benchmark config file (default /config/benchmark_config.json when present)
    #[arg(long, env = "BENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding documents_<scale>.json
    #[arg(long, env = "DATA_DIR", default_value = "/data")]
    data_dir: PathBuf,

    /// Corpus file, overriding --data-dir
    #[arg(long)]
    data_file: Option<PathBuf>,

    #[arg(long, env = "RESULTS_DIR", default_value = "results")]
    results_dir: PathBuf,

    /// Documents per bulk request
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Query types to run, comma separated
    #[arg(long, value_delimiter = ',', default_value = "1,2,3")]
    queries: Vec<u8>,

    #[arg(long)]
    skip_warmup: bool,

    /// Only log warnings and errors; skip the result tables
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args, Debug)]
struct ParadeDbArgs {
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    host: String,

    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    port: u16,

    #[arg(long, env = "POSTGRES_DB", default_value = "benchmark_db")]
    dbname: String,

    #[arg(long, env = "POSTGRES_USER", default_value = "benchmark_user")]
    user: String,

    #[arg(long, env = "POSTGRES_PASSWORD", default_value = "benchmark_password_123", hide_env_values = true)]
    password: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct ElasticsearchArgs {
    #[arg(long, env = "ES_HOST", default_value = "localhost")]
    host: String,

    #[arg(long, env = "ES_PORT", default_value_t = 9200)]
    port: u16,

    #[arg(long, env = "INDEX_NAME", default_value = "documents")]
    index: String,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let quiet = match &cli.target {
        Target::Paradedb(args) => args.common.quiet,
        Target::Elasticsearch(args) => args.common.quiet,
    };
    searchbench::init_tracing(quiet);

    let outcome = match cli.target {
        Target::Paradedb(args) => {
            let backend = ParadeDb::new(ParadeDbConfig {
                host: args.host,
                port: args.port,
                dbname: args.dbname,
                user: args.user,
                password: args.password,
            });
            benchmark(&backend, &args.common)
        }
        Target::Elasticsearch(args) => Elasticsearch::new(ElasticsearchConfig {
            host: args.host,
            port: args.port,
            index: args.index,
        })
        .and_then(|backend| benchmark(&backend, &args.common)),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Benchmark failed: {}", e);
            eprintln!("searchbench: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn benchmark<B: SearchBackend>(backend: &B, args: &CommonArgs) -> Result<()> {
    let config = BenchmarkConfig::resolve(args.config.as_deref())?;
    let catalog = config.catalog()?;
    let plan = RunPlan::new(args.transactions, args.concurrency)?;

    let options = RunOptions {
        scale: args.scale,
        data_file: args
            .data_file
            .clone()
            .unwrap_or_else(|| args.scale.data_file(&args.data_dir)),
        expected_records: config.expected_size(args.scale),
        batch_size: args.batch_size,
        plan,
        pool_size: args.pool_size.unwrap_or(args.concurrency),
        queries: args.queries.clone(),
        warmup: !args.skip_warmup,
        results_dir: args.results_dir.clone(),
        wait: RetryPolicy::default(),
        print: !args.quiet,
    };

    info!(
        "Benchmarking {} at {} scale: {} transactions x {} workers, queries {:?}",
        backend.name(),
        options.scale,
        plan.transactions,
        plan.concurrency,
        options.queries
    );
    run_all(backend, &catalog, &options)?;
    Ok(())
}
