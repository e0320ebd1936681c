use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown query type: {0}")]
    UnknownQueryType(u8),

    #[error("{target} unreachable after {attempts} attempts: {last}")]
    Unreachable {
        target: String,
        attempts: u32,
        last: String,
    },

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Plot error: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, BenchError>;
