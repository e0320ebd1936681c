//! Database backends under benchmark.
//!
//! A backend owns the wire client for one target store. The setup pipeline
//! drives its one-shot stages in order (`reset`, `load_batch`, `build_index`,
//! `analyze`) and the runner drives `render` + `execute` from many threads,
//! each on its own pooled session.

pub mod elasticsearch;
pub mod paradedb;

use crate::catalog::QueryTerms;
use crate::document::Document;
use crate::error::Result;

pub use elasticsearch::{Elasticsearch, ElasticsearchConfig};
pub use paradedb::{ParadeDb, ParadeDbConfig};

pub trait SearchBackend: Sync {
    /// A reusable connection or HTTP session, checked out by one worker at a time.
    type Session: Send;
    /// A rendered query: SQL text or a search request body.
    type Query;

    /// Short lowercase name used in result file names.
    fn name(&self) -> &'static str;

    /// One reachability probe with a short timeout.
    fn ping(&self) -> Result<()>;

    /// A session for benchmark queries.
    fn connect(&self) -> Result<Self::Session>;

    /// A session for the bulk load, which may need longer per-statement limits.
    fn connect_loader(&self) -> Result<Self::Session> {
        self.connect()
    }

    /// Drop and recreate the target schema or index.
    fn reset(&self) -> Result<()>;

    /// Bulk-insert one batch in a single round trip; returns records accepted.
    fn load_batch(&self, session: &mut Self::Session, batch: &[Document]) -> Result<usize>;

    /// Build the search index over the loaded documents.
    fn build_index(&self) -> Result<()>;

    /// Statistics or cache-warming step after indexing.
    fn analyze(&self) -> Result<()> {
        Ok(())
    }

    fn count(&self, session: &mut Self::Session) -> Result<u64>;

    /// On-disk footprint of the loaded corpus and index.
    fn size_bytes(&self, session: &mut Self::Session) -> Result<u64>;

    fn render(&self, terms: &QueryTerms<'_>) -> Self::Query;

    /// Run a query and return the number of hits.
    fn execute(&self, session: &mut Self::Session, query: &Self::Query) -> Result<usize>;
}
