//! Query catalog: the fixed battery of search queries issued by the runner.
//!
//! Each query type is a tagged variant carrying only the term lists it needs.
//! For a 1-based iteration index `i`, every list is indexed round-robin with
//! `(i - 1) % len`, so the same `i` always selects the same terms and every
//! term is covered once the transaction count reaches the list length.
//! Backends turn the selected [`QueryTerms`] into SQL or a search request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Highest query-type identifier the catalog accepts.
pub const MAX_QUERY_ID: u8 = 6;

/// Term lists of one query type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryKind {
    SimpleTerm {
        terms: Vec<String>,
    },
    Phrase {
        phrases: Vec<String>,
    },
    Disjunction {
        term1s: Vec<String>,
        term2s: Vec<String>,
    },
    Boolean {
        must_terms: Vec<String>,
        should_terms: Vec<String>,
        not_terms: Vec<String>,
    },
    TopN {
        terms: Vec<String>,
        limit: usize,
    },
    ParentJoin {
        terms: Vec<String>,
    },
}

impl QueryKind {
    /// Number of hits requested from the database.
    pub fn limit(&self) -> usize {
        match self {
            QueryKind::SimpleTerm { .. } | QueryKind::Phrase { .. } | QueryKind::ParentJoin { .. } => 10,
            QueryKind::Disjunction { .. } | QueryKind::Boolean { .. } => 20,
            QueryKind::TopN { limit, .. } => *limit,
        }
    }

    fn lists(&self) -> Vec<(&'static str, &[String])> {
        match self {
            QueryKind::SimpleTerm { terms } => vec![("terms", terms.as_slice())],
            QueryKind::Phrase { phrases } => vec![("phrases", phrases.as_slice())],
            QueryKind::Disjunction { term1s, term2s } => {
                vec![("term1s", term1s.as_slice()), ("term2s", term2s.as_slice())]
            }
            QueryKind::Boolean { must_terms, should_terms, not_terms } => vec![
                ("must_terms", must_terms.as_slice()),
                ("should_terms", should_terms.as_slice()),
                ("not_terms", not_terms.as_slice()),
            ],
            QueryKind::TopN { terms, .. } | QueryKind::ParentJoin { terms } => {
                vec![("terms", terms.as_slice())]
            }
        }
    }
}

/// One query type of the benchmark battery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub id: u8,
    pub name: String,
    #[serde(flatten)]
    pub kind: QueryKind,
}

/// Terms selected for a single iteration, ready to be rendered by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryTerms<'a> {
    Term { term: &'a str, limit: usize },
    Phrase { phrase: &'a str, limit: usize },
    Either { first: &'a str, second: &'a str, limit: usize },
    Boolean { must: &'a str, should: &'a str, not: &'a str, limit: usize },
    ParentMatch { term: &'a str, limit: usize },
}

fn round_robin(list: &[String], index: usize) -> &str {
    &list[index.saturating_sub(1) % list.len()]
}

impl QuerySpec {
    pub fn new(id: u8, name: &str, kind: QueryKind) -> Self {
        QuerySpec {
            id,
            name: name.to_string(),
            kind,
        }
    }

    /// Select the terms for 1-based iteration `index`.
    ///
    /// # Panics
    ///
    /// If a term list is empty. [`QueryCatalog::new`] and
    /// [`crate::pipeline::run_query_type`] reject such specs through
    /// [`QuerySpec::validate`].
    pub fn select(&self, index: usize) -> QueryTerms<'_> {
        let limit = self.kind.limit();
        match &self.kind {
            QueryKind::SimpleTerm { terms } | QueryKind::TopN { terms, .. } => QueryTerms::Term {
                term: round_robin(terms, index),
                limit,
            },
            QueryKind::Phrase { phrases } => QueryTerms::Phrase {
                phrase: round_robin(phrases, index),
                limit,
            },
            QueryKind::Disjunction { term1s, term2s } => QueryTerms::Either {
                first: round_robin(term1s, index),
                second: round_robin(term2s, index),
                limit,
            },
            QueryKind::Boolean { must_terms, should_terms, not_terms } => QueryTerms::Boolean {
                must: round_robin(must_terms, index),
                should: round_robin(should_terms, index),
                not: round_robin(not_terms, index),
                limit,
            },
            QueryKind::ParentJoin { terms } => QueryTerms::ParentMatch {
                term: round_robin(terms, index),
                limit,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id == 0 || self.id > MAX_QUERY_ID {
            return Err(BenchError::InvalidConfig(format!(
                "query '{}' has id {}, expected 1..={}",
                self.name, self.id, MAX_QUERY_ID
            )));
        }
        for (field, list) in self.kind.lists() {
            if list.is_empty() {
                return Err(BenchError::InvalidConfig(format!(
                    "query {} ('{}'): '{}' must not be empty",
                    self.id, self.name, field
                )));
            }
        }
        if self.kind.limit() == 0 {
            return Err(BenchError::InvalidConfig(format!(
                "query {} ('{}'): limit must be positive",
                self.id, self.name
            )));
        }
        Ok(())
    }
}

/// Validated set of query specs keyed by identifier.
#[derive(Clone, Debug)]
pub struct QueryCatalog {
    specs: BTreeMap<u8, QuerySpec>,
}

impl QueryCatalog {
    pub fn new<I>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = QuerySpec>,
    {
        let mut map = BTreeMap::new();
        for spec in specs {
            spec.validate()?;
            let id = spec.id;
            if map.insert(id, spec).is_some() {
                return Err(BenchError::InvalidConfig(format!("duplicate query id {}", id)));
            }
        }
        Ok(QueryCatalog { specs: map })
    }

    /// Look up a query type; unknown ids are a configuration error.
    pub fn get(&self, id: u8) -> Result<&QuerySpec> {
        self.specs.get(&id).ok_or(BenchError::UnknownQueryType(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.specs.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for QueryCatalog {
    fn default() -> Self {
        QueryCatalog {
            specs: default_specs().into_iter().map(|s| (s.id, s)).collect(),
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

const TERMS: [&str; 8] = [
    "data", "information", "system", "service", "request", "report", "analysis", "record",
];

const SECOND_TERMS: [&str; 8] = [
    "public", "management", "processing", "delivery", "access", "collection", "storage", "retrieval",
];

const EXCLUDED_TERMS: [&str; 8] = [
    "draft", "archive", "legacy", "temporary", "deprecated", "sample", "test", "obsolete",
];

const PHRASES: [&str; 8] = [
    "public data",
    "service request",
    "data analysis",
    "information system",
    "record management",
    "data processing",
    "service delivery",
    "information access",
];

/// Built-in battery used when the config file has no `queries` section.
pub fn default_specs() -> Vec<QuerySpec> {
    vec![
        QuerySpec::new(1, "Simple Term Search", QueryKind::SimpleTerm { terms: words(&TERMS) }),
        QuerySpec::new(2, "Phrase Search", QueryKind::Phrase { phrases: words(&PHRASES) }),
        QuerySpec::new(
            3,
            "Complex Query",
            QueryKind::Disjunction {
                term1s: words(&TERMS),
                term2s: words(&SECOND_TERMS),
            },
        ),
        QuerySpec::new(
            4,
            "Boolean Query",
            QueryKind::Boolean {
                must_terms: words(&TERMS),
                should_terms: words(&SECOND_TERMS),
                not_terms: words(&EXCLUDED_TERMS),
            },
        ),
        QuerySpec::new(
            5,
            "Top-N Search",
            QueryKind::TopN {
                terms: words(&TERMS),
                limit: 100,
            },
        ),
        QuerySpec::new(6, "Parent Join", QueryKind::ParentJoin { terms: words(&TERMS) }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_wraps() {
        let catalog = QueryCatalog::default();
        let spec = catalog.get(1).unwrap();

        assert_eq!(spec.select(1), QueryTerms::Term { term: "data", limit: 10 });
        assert_eq!(spec.select(8), QueryTerms::Term { term: "record", limit: 10 });
        assert_eq!(spec.select(9), spec.select(1));
    }

    #[test]
    fn test_selection_is_periodic() {
        let catalog = QueryCatalog::default();
        for id in catalog.ids() {
            let spec = catalog.get(id).unwrap();
            for i in 1..=40 {
                assert_eq!(spec.select(i), spec.select(i + 8), "query {} index {}", id, i);
            }
        }
    }

    #[test]
    fn test_lists_advance_independently() {
        let spec = QuerySpec::new(
            3,
            "Complex Query",
            QueryKind::Disjunction {
                term1s: words(&["a", "b"]),
                term2s: words(&["x", "y", "z"]),
            },
        );

        assert_eq!(spec.select(3), QueryTerms::Either { first: "a", second: "z", limit: 20 });
        assert_eq!(spec.select(4), QueryTerms::Either { first: "b", second: "x", limit: 20 });
    }

    #[test]
    fn test_unknown_query_type() {
        let catalog = QueryCatalog::new(default_specs().into_iter().take(3)).unwrap();
        assert_eq!(catalog.len(), 3);

        match catalog.get(4) {
            Err(BenchError::UnknownQueryType(4)) => {}
            other => panic!("Expected UnknownQueryType, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_list_and_duplicates() {
        let empty = QuerySpec::new(1, "Empty", QueryKind::SimpleTerm { terms: vec![] });
        assert!(QueryCatalog::new(vec![empty]).is_err());

        let a = QuerySpec::new(2, "A", QueryKind::Phrase { phrases: words(&["x y"]) });
        let b = QuerySpec::new(2, "B", QueryKind::Phrase { phrases: words(&["y z"]) });
        assert!(QueryCatalog::new(vec![a, b]).is_err());

        let out_of_range = QuerySpec::new(7, "Seven", QueryKind::SimpleTerm { terms: words(&["x"]) });
        assert!(QueryCatalog::new(vec![out_of_range]).is_err());
    }

    #[test]
    fn test_top_n_limit() {
        let spec = QuerySpec::new(
            5,
            "Top-N Search",
            QueryKind::TopN { terms: words(&["data"]), limit: 0 },
        );
        assert!(spec.validate().is_err());

        let catalog = QueryCatalog::default();
        assert_eq!(catalog.get(5).unwrap().select(1), QueryTerms::Term { term: "data", limit: 100 });
    }

    #[test]
    fn test_tagged_json() {
        let json = r#"{"id": 3, "name": "Complex Query", "type": "disjunction",
                       "term1s": ["data"], "term2s": ["public"]}"#;
        let spec: QuerySpec = serde_json::from_str(json).unwrap();

        assert_eq!(spec.id, 3);
        assert!(matches!(spec.kind, QueryKind::Disjunction { .. }));
    }
}
