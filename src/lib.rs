//! searchbench - full-text search benchmark for ParadeDB and Elasticsearch.
//!
//! One run targets one database: wait for it to come up, recreate the
//! schema or index, bulk-load a JSON-lines corpus, build the search index,
//! then issue a fixed battery of queries from a pool of concurrent workers.
//! Timings land in plain text files plus a JSON summary that the
//! `generate_plots` tool turns into a side-by-side comparison.
//!
//! # Query battery
//!
//! | id | type          | ParadeDB                          | Elasticsearch   |
//! |----|---------------|-----------------------------------|-----------------|
//! | 1  | `simple_term` | `id @@@ 'content:<t>'`            | `match`         |
//! | 2  | `phrase`      | `id @@@ 'content:"<p>"'`          | `match_phrase`  |
//! | 3  | `disjunction` | `content:<a> OR content:<b>`      | `bool.should`   |
//! | 4  | `boolean`     | `+content:<m> content:<s> -content:<n>` | `bool` must/should/must_not |
//! | 5  | `top_n`       | as 1 with a larger `LIMIT`        | `match`, `size` |
//! | 6  | `parent_join` | self-join on `parent_id`          | `has_parent`    |
//!
//! # Example
//!
//! ```rust
//! use searchbench::{QueryCatalog, QueryTerms, RunPlan};
//!
//! let catalog = QueryCatalog::default();
//! let spec = catalog.get(1)?;
//! assert_eq!(spec.select(9), spec.select(1));
//! assert!(matches!(spec.select(1), QueryTerms::Term { limit: 10, .. }));
//!
//! let plan = RunPlan::new(10, 3)?;
//! let ranges: Vec<_> = plan.assignments().iter().map(|a| (a.start, a.end)).collect();
//! assert_eq!(ranges, vec![(1, 4), (5, 8), (9, 10)]);
//! # Ok::<(), searchbench::BenchError>(())
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod plots;
pub mod pool;
pub mod report;
pub mod retry;
pub mod runner;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use backend::{Elasticsearch, ElasticsearchConfig, ParadeDb, ParadeDbConfig, SearchBackend};
pub use catalog::{QueryCatalog, QueryKind, QuerySpec, QueryTerms};
pub use config::{BenchmarkConfig, Scale};
pub use document::{Document, DocumentReader};
pub use error::{BenchError, Result};
pub use pipeline::{run_all, RunOptions};
pub use pool::{Pool, PooledConnection};
pub use report::{ResultWriter, Summary};
pub use retry::{retry, RetryPolicy};
pub use runner::{RunPlan, RunResult, WorkerReport};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `warn` when `quiet`.
pub fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // a subscriber installed earlier in the process (tests, embedding) stays in place
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing(true);
        init_tracing(false);
        tracing::info!("subscriber still usable");
    }
}
