//! Elasticsearch backend over the REST API.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::backend::SearchBackend;
use crate::catalog::QueryTerms;
use crate::document::Document;
use crate::error::{BenchError, Result};
use crate::retry::{retry, RetryPolicy};

const PING_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const BULK_TIMEOUT: Duration = Duration::from_secs(60);

const PARENT: &str = "parent";
const CHILD: &str = "child";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElasticsearchConfig {
    pub host: String,
    pub port: u16,
    pub index: String,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        ElasticsearchConfig {
            host: "localhost".to_string(),
            port: 9200,
            index: "documents".to_string(),
        }
    }
}

pub struct Elasticsearch {
    config: ElasticsearchConfig,
    base_url: String,
    client: Client,
    index_wait: RetryPolicy,
}

impl Elasticsearch {
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        let base_url = format!("http://{}:{}", config.host, config.port);
        Ok(Elasticsearch {
            client: session()?,
            base_url,
            config,
            index_wait: RetryPolicy::default(),
        })
    }

    /// Override how long `build_index` waits for the index to turn yellow.
    pub fn with_index_wait(mut self, policy: RetryPolicy) -> Self {
        self.index_wait = policy;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn index_url(&self, path: &str) -> String {
        if path.is_empty() {
            self.url(&self.config.index)
        } else {
            self.url(&format!("{}/{}", self.config.index, path))
        }
    }

    fn wait_for_index(&self) -> Result<()> {
        let url = self.url(&format!(
            "_cluster/health/{}?wait_for_status=yellow&timeout=5s",
            self.config.index
        ));
        retry("elasticsearch index", self.index_wait, |_| {
            let health: Value = self.client.get(&url).send()?.error_for_status()?.json()?;
            check_health(&health)
        })
    }

    /// Action/source line pairs for one `_bulk` request.
    pub fn bulk_body(&self, batch: &[Document]) -> Result<String> {
        let mut body = String::new();
        for doc in batch {
            let (action, source) = match doc.parent_id {
                Some(parent) => (
                    json!({"index": {"_index": self.config.index, "_id": doc.key().to_string(), "routing": parent.to_string()}}),
                    json!({
                        "title": doc.title,
                        "content": doc.content,
                        "parent_id": parent,
                        "relation": {"name": CHILD, "parent": parent.to_string()},
                    }),
                ),
                None => (
                    json!({"index": {"_index": self.config.index, "_id": doc.key().to_string()}}),
                    json!({"title": doc.title, "content": doc.content, "relation": PARENT}),
                ),
            };
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&source)?);
            body.push('\n');
        }
        Ok(body)
    }
}

/// A fresh HTTP session with the default request timeout.
fn session() -> Result<Client> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

fn check_health(health: &Value) -> Result<()> {
    match health.get("status").and_then(Value::as_str) {
        Some("green") | Some("yellow") => Ok(()),
        other => Err(BenchError::Query(format!(
            "cluster status is {}",
            other.unwrap_or("unknown")
        ))),
    }
}

fn expect_success(response: Response, what: &str) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let text = response.text().unwrap_or_default();
        Err(BenchError::Setup(format!("{} failed ({}): {}", what, status, text)))
    }
}

/// Number of items a `_bulk` response reports as failed.
fn bulk_failures(response: &Value) -> usize {
    if !response.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return 0;
    }
    response
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| {
                    item.as_object()
                        .and_then(|obj| obj.values().next())
                        .is_some_and(|result| result.get("error").is_some())
                })
                .count()
        })
        .unwrap_or(0)
}

fn search_body(query: Value, size: usize) -> Value {
    json!({
        "query": query,
        "size": size,
        "_source": ["title"],
        "sort": [{"_score": "desc"}],
    })
}

fn hit_count(response: &Value) -> usize {
    response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

impl SearchBackend for Elasticsearch {
    type Session = Client;
    type Query = Value;

    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("_cluster/health"))
            .timeout(PING_TIMEOUT)
            .send()?
            .error_for_status()?;
        check_health(&response.json()?)
    }

    fn connect(&self) -> Result<Client> {
        session()
    }

    fn reset(&self) -> Result<()> {
        match self.client.delete(self.index_url("")).send() {
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                debug!("Index {} did not exist", self.config.index)
            }
            Ok(response) => {
                expect_success(response, "delete index")?;
            }
            Err(e) => warn!("Deleting index {} failed: {}", self.config.index, e),
        }

        let mapping = json!({
            "mappings": {
                "properties": {
                    "title": {"type": "text"},
                    "content": {"type": "text"},
                    "parent_id": {"type": "long"},
                    "relation": {"type": "join", "relations": {PARENT: CHILD}},
                }
            }
        });
        let response = self.client.put(self.index_url("")).json(&mapping).send()?;
        expect_success(response, "create index")?;
        info!("Created index {}", self.config.index);
        Ok(())
    }

    fn load_batch(&self, session: &mut Client, batch: &[Document]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let response = session
            .post(self.url("_bulk"))
            .header("Content-Type", "application/x-ndjson")
            .timeout(BULK_TIMEOUT)
            .body(self.bulk_body(batch)?)
            .send()?;
        let body: Value = expect_success(response, "bulk load")?.json()?;

        let failed = bulk_failures(&body);
        if failed > 0 {
            warn!("Bulk request rejected {} of {} documents", failed, batch.len());
        }
        Ok(batch.len() - failed.min(batch.len()))
    }

    fn build_index(&self) -> Result<()> {
        let response = self.client.post(self.index_url("_refresh")).send()?;
        expect_success(response, "refresh index")?;
        self.wait_for_index()
    }

    fn count(&self, session: &mut Client) -> Result<u64> {
        let body: Value = session
            .get(self.index_url("_count"))
            .send()?
            .error_for_status()?
            .json()?;
        body.get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| BenchError::Query("count response has no 'count'".into()))
    }

    fn size_bytes(&self, session: &mut Client) -> Result<u64> {
        let body: Value = session
            .get(self.index_url("_stats/store"))
            .send()?
            .error_for_status()?
            .json()?;
        body.pointer("/_all/primaries/store/size_in_bytes")
            .and_then(Value::as_u64)
            .ok_or_else(|| BenchError::Query("stats response has no store size".into()))
    }

    fn render(&self, terms: &QueryTerms<'_>) -> Value {
        match *terms {
            QueryTerms::Term { term, limit } => search_body(json!({"match": {"content": term}}), limit),
            QueryTerms::Phrase { phrase, limit } => {
                search_body(json!({"match_phrase": {"content": phrase}}), limit)
            }
            QueryTerms::Either { first, second, limit } => search_body(
                json!({"bool": {"should": [
                    {"match": {"content": first}},
                    {"match": {"content": second}},
                ]}}),
                limit,
            ),
            QueryTerms::Boolean { must, should, not, limit } => search_body(
                json!({"bool": {
                    "must": [{"match": {"content": must}}],
                    "should": [{"match": {"content": should}}],
                    "must_not": [{"match": {"content": not}}],
                }}),
                limit,
            ),
            QueryTerms::ParentMatch { term, limit } => search_body(
                json!({"has_parent": {
                    "parent_type": PARENT,
                    "query": {"match": {"content": term}},
                }}),
                limit,
            ),
        }
    }

    fn execute(&self, session: &mut Client, query: &Value) -> Result<usize> {
        let response: Value = session
            .post(self.index_url("_search"))
            .json(query)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(hit_count(&response))
    }
}
