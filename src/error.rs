// src/error.rs

//! Error types for the configuration pipeline
//!
//! A missing adapter is deliberately absent from this list: a source that
//! cannot be adapted yet is a normal pipeline state, not a failure.

use thiserror::Error;

/// Errors that can occur while building or running the pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Identity is neither a plain pid nor a factory pid + instance pair
    #[error("Invalid configuration identity: {0}")]
    InvalidIdentity(String),

    /// A key specification was built from a bad regular expression
    #[error("Invalid key pattern: {0}")]
    InvalidKeyPattern(#[from] regex::Error),

    /// Pipeline configuration is semantically invalid
    #[error("Invalid pipeline configuration: {0}")]
    Config(String),

    /// Pipeline configuration file could not be parsed
    #[error("Failed to parse pipeline configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration sink rejected or failed an operation
    #[error("Configuration sink error: {0}")]
    Sink(String),

    /// Operation on a configuration handle whose configuration is gone
    #[error("Configuration {0} has been deleted")]
    ConfigurationDeleted(String),

    /// `start()` called on a processor that already has a worker
    #[error("{0} is already running")]
    AlreadyRunning(String),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;
