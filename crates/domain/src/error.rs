/// Shared error type used across all Kagura crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("disconnected: {0}")]
    Disconnected(String),

    #[error("pipeline {pipeline}: {message}")]
    Pipeline { pipeline: String, message: String },

    #[error("template: {0}")]
    Template(String),

    #[error("config: {0}")]
    Config(String),

    #[error("bus closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
