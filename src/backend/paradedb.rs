//! ParadeDB (Postgres + pg_search) backend.

use std::time::Duration;

use postgres::types::ToSql;
use postgres::{Client, NoTls};
use tracing::{debug, info};

use crate::backend::SearchBackend;
use crate::catalog::QueryTerms;
use crate::document::Document;
use crate::error::{BenchError, Result};

const PING_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `statement_timeout` per session purpose; zero disables the limit.
const QUERY_STATEMENT_TIMEOUT: Duration = Duration::from_secs(10);
const LOAD_STATEMENT_TIMEOUT: Duration = Duration::from_secs(60);
const DDL_STATEMENT_TIMEOUT: Duration = Duration::ZERO;

/// Postgres caps bind parameters at 65535 per statement; four per row.
const MAX_ROWS_PER_INSERT: usize = 16_000;

const SCHEMA_SQL: &str = "
    CREATE EXTENSION IF NOT EXISTS pg_search;
    DROP TABLE IF EXISTS documents;
    CREATE TABLE documents (
        id BIGINT PRIMARY KEY,
        title TEXT,
        content TEXT,
        parent_id BIGINT
    );
";

const INDEX_SQL: &str = "
    CREATE INDEX documents_search_idx ON documents
    USING bm25 (id, title, content)
    WITH (key_field='id');
";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParadeDbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl Default for ParadeDbConfig {
    fn default() -> Self {
        ParadeDbConfig {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "benchmark_db".to_string(),
            user: "benchmark_user".to_string(),
            password: "benchmark_password_123".to_string(),
        }
    }
}

pub struct ParadeDb {
    config: ParadeDbConfig,
}

impl ParadeDb {
    pub fn new(config: ParadeDbConfig) -> Self {
        ParadeDb { config }
    }

    fn client_config(&self, dbname: &str, timeout: Duration, statement_timeout: Duration) -> postgres::Config {
        let mut pg = postgres::Config::new();
        pg.host(&self.config.host)
            .port(self.config.port)
            .user(&self.config.user)
            .password(&self.config.password)
            .dbname(dbname)
            .application_name("searchbench")
            .connect_timeout(timeout)
            .options(&format!("-c statement_timeout={}", statement_timeout.as_millis()));
        pg
    }

    fn open(&self, dbname: &str, statement_timeout: Duration) -> Result<Client> {
        Ok(self
            .client_config(dbname, CONNECT_TIMEOUT, statement_timeout)
            .connect(NoTls)?)
    }

    /// Session for schema, index and maintenance statements, which run unbounded.
    fn open_ddl(&self, dbname: &str) -> Result<Client> {
        self.open(dbname, DDL_STATEMENT_TIMEOUT)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape a term for use inside a single-quoted SQL literal.
fn literal(term: &str) -> String {
    term.replace('\'', "''")
}

fn setup_error(stage: &'static str) -> impl FnOnce(postgres::Error) -> BenchError {
    move |e| BenchError::Setup(format!("{}: {}", stage, e))
}

impl SearchBackend for ParadeDb {
    type Session = Client;
    type Query = String;

    fn name(&self) -> &'static str {
        "paradedb"
    }

    fn ping(&self) -> Result<()> {
        let client = self
            .client_config("postgres", PING_TIMEOUT, QUERY_STATEMENT_TIMEOUT)
            .connect(NoTls)?;
        drop(client);
        Ok(())
    }

    fn connect(&self) -> Result<Client> {
        self.open(&self.config.dbname, QUERY_STATEMENT_TIMEOUT)
    }

    fn connect_loader(&self) -> Result<Client> {
        self.open(&self.config.dbname, LOAD_STATEMENT_TIMEOUT)
    }

    fn reset(&self) -> Result<()> {
        let db = quote_ident(&self.config.dbname);
        let mut admin = self.open_ddl("postgres")?;
        admin
            .batch_execute(&format!("DROP DATABASE IF EXISTS {}", db))
            .map_err(setup_error("drop database"))?;
        admin
            .batch_execute(&format!("CREATE DATABASE {}", db))
            .map_err(setup_error("create database"))?;
        drop(admin);

        let mut client = self.open_ddl(&self.config.dbname)?;
        client.batch_execute(SCHEMA_SQL).map_err(setup_error("create table"))?;
        info!("Created table documents in {}", self.config.dbname);
        Ok(())
    }

    fn load_batch(&self, session: &mut Client, batch: &[Document]) -> Result<usize> {
        let mut tx = session.transaction()?;
        for chunk in batch.chunks(MAX_ROWS_PER_INSERT) {
            let mut sql = String::from("INSERT INTO documents (id, title, content, parent_id) VALUES ");
            let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 4);
            for (row, doc) in chunk.iter().enumerate() {
                let base = row * 4;
                if row > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&format!("(${}, ${}, ${}, ${})", base + 1, base + 2, base + 3, base + 4));
                params.push(&doc.id);
                params.push(&doc.title);
                params.push(&doc.content);
                params.push(&doc.parent_id);
            }
            tx.execute(sql.as_str(), &params)?;
        }
        tx.commit()?;
        debug!("Inserted batch of {} documents", batch.len());
        Ok(batch.len())
    }

    fn build_index(&self) -> Result<()> {
        let mut client = self.open_ddl(&self.config.dbname)?;
        client.batch_execute(INDEX_SQL).map_err(setup_error("create bm25 index"))?;
        Ok(())
    }

    fn analyze(&self) -> Result<()> {
        let mut client = self.open_ddl(&self.config.dbname)?;
        client
            .batch_execute("VACUUM ANALYZE documents;")
            .map_err(setup_error("vacuum analyze"))?;
        Ok(())
    }

    fn count(&self, session: &mut Client) -> Result<u64> {
        let count: i64 = session.query_one("SELECT COUNT(*) FROM documents", &[])?.get(0);
        Ok(count as u64)
    }

    fn size_bytes(&self, session: &mut Client) -> Result<u64> {
        let size: i64 = session
            .query_one("SELECT pg_database_size(current_database())", &[])?
            .get(0);
        Ok(size as u64)
    }

    fn render(&self, terms: &QueryTerms<'_>) -> String {
        match *terms {
            QueryTerms::Term { term, limit } => format!(
                "SELECT id, title FROM documents WHERE id @@@ 'content:{}' ORDER BY paradedb.score(id) DESC LIMIT {};",
                literal(term),
                limit
            ),
            QueryTerms::Phrase { phrase, limit } => format!(
                "SELECT id, title FROM documents WHERE id @@@ 'content:\"{}\"' LIMIT {};",
                literal(&phrase.replace('"', "")),
                limit
            ),
            QueryTerms::Either { first, second, limit } => format!(
                "SELECT id, title FROM documents WHERE id @@@ 'content:{} OR content:{}' ORDER BY paradedb.score(id) DESC LIMIT {};",
                literal(first),
                literal(second),
                limit
            ),
            QueryTerms::Boolean { must, should, not, limit } => format!(
                "SELECT id, title FROM documents WHERE id @@@ '+content:{} content:{} -content:{}' ORDER BY paradedb.score(id) DESC LIMIT {};",
                literal(must),
                literal(should),
                literal(not),
                limit
            ),
            QueryTerms::ParentMatch { term, limit } => format!(
                "SELECT c.id, c.title FROM documents c JOIN documents p ON c.parent_id = p.id WHERE p.id @@@ 'content:{}' LIMIT {};",
                literal(term),
                limit
            ),
        }
    }

    fn execute(&self, session: &mut Client, query: &String) -> Result<usize> {
        Ok(session.query(query.as_str(), &[])?.len())
    }
}
