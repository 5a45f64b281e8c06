//! Core error types for cadence-core.
//!
//! This module defines the error hierarchy using thiserror. Gateway and
//! cache failures are recoverable and surface to the operator; invariant
//! violations indicate a caller bug and never mutate the plan.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for cadence-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Account data gateway failures (fetch or write)
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Operational cache storage failures
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Caller passed a reference that does not exist in the current plan
    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by an [`AccountGateway`](crate::gateway::AccountGateway).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The backing data service could not be reached
    #[error("data service unavailable: {0}")]
    Unavailable(String),

    /// The referenced row does not exist
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    /// Row creation hit an existing row; callers that only need the row to exist ignore this
    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: String, id: String },

    /// The service refused the write
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Operational cache storage errors.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Failed to open the cache database
    #[error("Failed to open cache at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Cache database is locked")]
    Locked,

    /// Could not determine the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),

    /// Failed to encode a record before saving
    #[error("Failed to encode '{key}': {message}")]
    Encode { key: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// References that cannot be resolved against the current plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    /// No batch with the given index
    #[error("batch {0} is not in the current plan")]
    UnknownBatch(usize),

    /// The batch has no task for the account
    #[error("account '{account_id}' has no task in batch {batch_index}")]
    NoTaskForAccount {
        account_id: String,
        batch_index: usize,
    },

    /// Item index past the end of the task
    #[error("Index {index} out of bounds for task of '{account_id}' (length: {len})")]
    ItemOutOfBounds {
        account_id: String,
        index: usize,
        len: usize,
    },
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked {
                    CacheError::Locked
                } else {
                    CacheError::QueryFailed(err.to_string())
                }
            }
            _ => CacheError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
