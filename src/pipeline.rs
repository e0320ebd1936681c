//! End-to-end benchmark flow for one backend.
//!
//! `wait_until_ready` → `setup` (reset, load, index, analyze) → `benchmark`
//! (warmup + measured phase per query type). Stage timings and per-query
//! results are persisted as soon as each step completes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, warn};

use crate::backend::SearchBackend;
use crate::catalog::{QueryCatalog, QuerySpec};
use crate::config::Scale;
use crate::document::DocumentReader;
use crate::error::{BenchError, Result};
use crate::pool::Pool;
use crate::report::{print_summary, ResultWriter, Stage, StageTimings, Summary};
use crate::retry::{retry, RetryPolicy};
use crate::runner::{self, RunPlan, RunResult};

pub const DEFAULT_BATCH_SIZE: usize = 5_000;

/// Everything one benchmark invocation needs besides the backend.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub scale: Scale,
    pub data_file: PathBuf,
    /// Stop loading after this many records.
    pub expected_records: usize,
    pub batch_size: usize,
    pub plan: RunPlan,
    pub pool_size: usize,
    pub queries: Vec<u8>,
    pub warmup: bool,
    pub results_dir: PathBuf,
    pub wait: RetryPolicy,
    /// Print the result tables to stdout.
    pub print: bool,
}

/// Outcome of the setup stages.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetupReport {
    pub timings: StageTimings,
    pub loaded: usize,
    pub skipped: usize,
    pub count: u64,
    pub size_bytes: Option<u64>,
}

/// Block until the backend answers a ping or the policy gives up.
pub fn wait_until_ready<B: SearchBackend>(backend: &B, policy: RetryPolicy) -> Result<()> {
    retry(backend.name(), policy, |_| backend.ping())?;
    info!("{} is ready", backend.name());
    Ok(())
}

/// Recreate the schema, load the corpus, then build and analyze the index.
pub fn setup<B: SearchBackend>(backend: &B, options: &RunOptions, writer: &ResultWriter) -> Result<SetupReport> {
    let mut report = SetupReport::default();

    let started = Instant::now();
    backend.reset()?;
    report.timings.schema_setup = started.elapsed().as_secs_f64();
    writer.write_stage(Stage::SchemaSetup, report.timings.schema_setup)?;

    let started = Instant::now();
    let (loaded, skipped) = load(backend, options)?;
    report.timings.data_loading = started.elapsed().as_secs_f64();
    writer.write_stage(Stage::DataLoading, report.timings.data_loading)?;
    report.loaded = loaded;
    report.skipped = skipped;

    let started = Instant::now();
    backend.build_index()?;
    report.timings.index_creation = started.elapsed().as_secs_f64();
    writer.write_stage(Stage::IndexCreation, report.timings.index_creation)?;

    let started = Instant::now();
    backend.analyze()?;
    report.timings.analyze = started.elapsed().as_secs_f64();
    writer.write_stage(Stage::Analyze, report.timings.analyze)?;

    let mut session = backend.connect()?;
    report.count = backend.count(&mut session)?;
    info!("Total documents in {}: {}", backend.name(), report.count);

    report.size_bytes = match backend.size_bytes(&mut session) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("Could not read storage size: {}", e);
            None
        }
    };

    Ok(report)
}

fn load<B: SearchBackend>(backend: &B, options: &RunOptions) -> Result<(usize, usize)> {
    let mut reader = DocumentReader::open(&options.data_file, options.expected_records)?;
    let mut session = backend.connect_loader()?;
    let mut loaded = 0;

    loop {
        let batch = reader.next_batch(options.batch_size)?;
        if batch.is_empty() {
            break;
        }
        loaded += backend.load_batch(&mut session, &batch)?;
        info!("Loaded {} records", loaded);
    }

    if reader.accepted() < options.expected_records {
        warn!(
            "Data file {} held {} records, expected {}",
            options.data_file.display(),
            reader.accepted(),
            options.expected_records
        );
    }
    if reader.skipped() > 0 {
        warn!("Skipped {} malformed records", reader.skipped());
    }
    Ok((loaded, reader.skipped()))
}

/// Run one query type through the runner against `pool`.
///
/// `spec` is validated first, so a hand-built spec with an empty term list
/// is rejected before any worker starts.
pub fn run_query_type<B: SearchBackend>(
    backend: &B,
    pool: &Pool<B::Session>,
    spec: &QuerySpec,
    plan: RunPlan,
) -> Result<RunResult> {
    spec.validate()?;
    Ok(runner::run(
        pool,
        plan,
        spec.id,
        |i| backend.render(&spec.select(i)),
        |session, query| backend.execute(session, query),
    ))
}

/// Warmup and measured phase for each requested query type.
///
/// Unknown ids fail before any query is issued. Each measured result is
/// written to its file as soon as it is available.
pub fn benchmark<B: SearchBackend>(
    backend: &B,
    catalog: &QueryCatalog,
    options: &RunOptions,
    writer: &ResultWriter,
) -> Result<Vec<RunResult>> {
    let specs = options
        .queries
        .iter()
        .map(|&id| catalog.get(id))
        .collect::<Result<Vec<_>>>()?;

    let pool = Pool::new(options.pool_size, |_| backend.connect())?;
    info!("Opened {} {} sessions", pool.capacity(), backend.name());

    let mut results = Vec::with_capacity(specs.len());
    for spec in specs {
        if options.warmup {
            let warmup = run_query_type(backend, &pool, spec, options.plan.warmup())?;
            info!(
                "Warmup for query {} ({}): {} queries, {} failed",
                spec.id, spec.name, warmup.transactions, warmup.failed
            );
        }

        let result = run_query_type(backend, &pool, spec, options.plan)?;
        if result.failed > 0 {
            warn!("Query {}: {} of {} queries failed", spec.id, result.failed, result.transactions);
        }
        info!(
            "Query {} ({}): avg {:.6}s, wall {:.6}s, {:.2} TPS",
            spec.id, spec.name, result.average_latency, result.wall_time, result.tps
        );
        writer.write_query(&result)?;
        results.push(result);
    }
    Ok(results)
}

/// Wait, set up, benchmark, and write the summary.
pub fn run_all<B: SearchBackend>(backend: &B, catalog: &QueryCatalog, options: &RunOptions) -> Result<Summary> {
    if options.batch_size == 0 {
        return Err(BenchError::InvalidConfig("batch size must be at least 1".into()));
    }
    for &id in &options.queries {
        catalog.get(id)?;
    }

    let writer = ResultWriter::new(&options.results_dir, options.scale, backend.name())?;

    wait_until_ready(backend, options.wait)?;
    let setup = setup(backend, options, &writer)?;
    let results = benchmark(backend, catalog, options, &writer)?;

    let summary = Summary::new(backend.name(), options.scale, &setup.timings, setup.size_bytes, &results);
    writer.write_summary(&summary)?;

    if options.print {
        let labels: BTreeMap<u8, String> = results
            .iter()
            .filter_map(|r| catalog.get(r.query_id).ok().map(|s| (r.query_id, s.name.clone())))
            .collect();
        print_summary(&summary, &labels, &results);
    }
    Ok(summary)
}
