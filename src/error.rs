//! Error taxonomy for the ingestion pipeline.
//!
//! Per-source and per-entry failures never cross the cycle boundary; only
//! [`ConfigError`] (and a storage backend that cannot be opened at boot)
//! is allowed to stop the process.

use thiserror::Error;

/// A single fetch/parse attempt failed. Retried up to the configured bound,
/// after which the source is skipped for the cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("feed parse error: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
}

/// A parsed entry lacks a field required to become an article. Permanent:
/// the entry is dropped, never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("entry is missing a usable {field}")]
pub struct MalformedEntry {
    pub field: &'static str,
}

impl MalformedEntry {
    pub fn missing(field: &'static str) -> Self {
        Self { field }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt article row {id}: {message}")]
    CorruptRow { id: i64, message: String },
}

/// Why a cycle produced no commit.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a cycle is already in progress")]
    AlreadyRunning,

    #[error("persistence failed, cycle discarded: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
