//! Benchmark configuration file and dataset scales.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::{default_specs, QueryCatalog, QuerySpec};
use crate::error::{BenchError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "/config/benchmark_config.json";

/// Named dataset-size tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Small,
    Medium,
    Large,
}

impl Scale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Small => "small",
            Scale::Medium => "medium",
            Scale::Large => "large",
        }
    }

    /// Line-delimited JSON corpus for this scale inside `data_dir`.
    pub fn data_file(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(format!("documents_{}.json", self.as_str()))
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scale {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(Scale::Small),
            "medium" => Ok(Scale::Medium),
            "large" => Ok(Scale::Large),
            other => Err(BenchError::InvalidConfig(format!(
                "unknown scale '{}', expected small, medium or large",
                other
            ))),
        }
    }
}

/// Expected record count per scale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSizes {
    pub small_scale: usize,
    pub medium_scale: usize,
    pub large_scale: usize,
}

impl Default for DataSizes {
    fn default() -> Self {
        DataSizes {
            small_scale: 10_000,
            medium_scale: 100_000,
            large_scale: 1_000_000,
        }
    }
}

fn default_queries() -> BTreeMap<String, QuerySpec> {
    default_specs()
        .into_iter()
        .map(|spec| (format!("query{}", spec.id), spec))
        .collect()
}

/// Contents of `benchmark_config.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    #[serde(default)]
    pub data: DataSizes,
    #[serde(default = "default_queries")]
    pub queries: BTreeMap<String, QuerySpec>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            data: DataSizes::default(),
            queries: default_queries(),
        }
    }
}

impl BenchmarkConfig {
    /// Read and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            BenchError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Load `path` when given; otherwise the default location if it exists,
    /// else the built-in configuration.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                info!("Loading config from {}", path.display());
                Self::load(path)
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => {
                warn!("No config file at {}, using built-in queries", DEFAULT_CONFIG_PATH);
                Ok(Self::default())
            }
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: BenchmarkConfig = serde_json::from_str(text)?;
        config.catalog()?;
        Ok(config)
    }

    pub fn expected_size(&self, scale: Scale) -> usize {
        match scale {
            Scale::Small => self.data.small_scale,
            Scale::Medium => self.data.medium_scale,
            Scale::Large => self.data.large_scale,
        }
    }

    /// Build the validated query catalog from the `queries` section.
    pub fn catalog(&self) -> Result<QueryCatalog> {
        QueryCatalog::new(self.queries.values().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_parsing() {
        assert_eq!("small".parse::<Scale>().unwrap(), Scale::Small);
        assert_eq!("MEDIUM".parse::<Scale>().unwrap(), Scale::Medium);
        assert!("huge".parse::<Scale>().is_err());
        assert_eq!(Scale::Large.to_string(), "large");
    }

    #[test]
    fn test_data_file() {
        let path = Scale::Medium.data_file(Path::new("/data"));
        assert_eq!(path, PathBuf::from("/data/documents_medium.json"));
    }

    #[test]
    fn test_sizes_only_config() {
        let config = BenchmarkConfig::from_json(
            r#"{"data": {"small_scale": 50, "medium_scale": 500, "large_scale": 5000}}"#,
        )
        .unwrap();

        assert_eq!(config.expected_size(Scale::Small), 50);
        assert_eq!(config.expected_size(Scale::Large), 5000);
        assert_eq!(config.catalog().unwrap().len(), 6);
    }

    #[test]
    fn test_custom_queries() {
        let config = BenchmarkConfig::from_json(
            r#"{
                "data": {"small_scale": 1, "medium_scale": 2, "large_scale": 3},
                "queries": {
                    "simple": {"id": 1, "name": "Simple", "type": "simple_term", "terms": ["a", "b"]},
                    "top": {"id": 5, "name": "Top", "type": "top_n", "terms": ["a"], "limit": 50}
                }
            }"#,
        )
        .unwrap();

        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec![1, 5]);
        assert_eq!(catalog.get(5).unwrap().kind.limit(), 50);
    }

    #[test]
    fn test_invalid_queries_rejected() {
        let result = BenchmarkConfig::from_json(
            r#"{"queries": {"bad": {"id": 2, "name": "Bad", "type": "phrase", "phrases": []}}}"#,
        );
        assert!(matches!(result, Err(BenchError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = BenchmarkConfig::load("/nonexistent/benchmark_config.json");
        assert!(matches!(result, Err(BenchError::InvalidConfig(_))));
    }

    #[test]
    fn test_resolve_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchmark_config.json");
        fs::write(&path, r#"{"data": {"small_scale": 7, "medium_scale": 8, "large_scale": 9}}"#).unwrap();

        let config = BenchmarkConfig::resolve(Some(path.as_path())).unwrap();
        assert_eq!(config.expected_size(Scale::Small), 7);
        assert!(BenchmarkConfig::resolve(Some(dir.path().join("missing.json").as_path())).is_err());
    }
}
