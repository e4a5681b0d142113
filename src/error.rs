//! Custom error types for the curator
//!
//! Provides structured, typed errors instead of generic Box<dyn Error>

use std::fmt;

use thiserror::Error;

/// Top-level curator errors
#[derive(Error, Debug)]
pub enum CuratorError {
    #[error("No source could serve {ticker} ({} failed attempts)", .failures.len())]
    SourceUnavailable {
        ticker: String,
        failures: Vec<SourceFailure>,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Persist failed: {0}")]
    Persist(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// One failed attempt against a single source, kept for aggregate reporting
#[derive(Clone, Debug)]
pub struct SourceFailure {
    pub source: String,
    pub message: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Source adapter errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rate limited by {source_name}")]
    RateLimited { source_name: String },

    #[error("{source_name} does not support {operation}")]
    Unsupported {
        source_name: String,
        operation: &'static str,
    },

    #[error("Empty response for {0}")]
    Empty(String),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Persistent store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write failed: {0}")]
    Write(String),
}

pub type CuratorResult<T> = Result<T, CuratorError>;
pub type SourceResult<T> = Result<T, SourceError>;
pub type StoreResult<T> = Result<T, StoreError>;

impl From<serde_yaml::Error> for CuratorError {
    fn from(err: serde_yaml::Error) -> Self {
        CuratorError::Configuration(err.to_string())
    }
}

impl From<std::io::Error> for CuratorError {
    fn from(err: std::io::Error) -> Self {
        CuratorError::Configuration(err.to_string())
    }
}
