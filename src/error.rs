//! Error types for media-dl
//!
//! This module provides the error taxonomy for the batch engine:
//! - [`ResolutionError`] - the source locator could not be enumerated (fatal for the batch)
//! - [`FetchError`] - a single item transfer failed (retried, then terminal for that item)
//! - [`LedgerError`] - the dedup ledger could not be read or written (degraded, never fatal)
//! - [`Error::Config`] - invalid configuration, rejected before the batch starts

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
///
/// Only configuration problems, destination setup failures and batch resolution
/// failures surface through this type. Per-item failures are reported as
/// outcomes inside the batch report instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_duration")
        key: Option<String>,
    },

    /// The source locator could not be resolved into item descriptors
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// External tool could not be located or started
    #[error("external tool error: {0}")]
    ExternalTool(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Errors raised while enumerating a source locator
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The locator is not something the fetch service can handle
    #[error("invalid locator '{locator}': {reason}")]
    InvalidLocator {
        /// The locator as supplied by the caller
        locator: String,
        /// Why it was rejected
        reason: String,
    },

    /// The external tool exited unsuccessfully
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        /// Name of the tool that was run
        tool: String,
        /// Exit status description
        status: String,
        /// Captured standard error (trimmed)
        stderr: String,
    },

    /// The metadata document could not be understood
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// I/O error while running the tool
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a single download attempt
#[derive(Debug, Error)]
pub enum FetchError {
    /// The external tool exited unsuccessfully
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        /// Name of the tool that was run
        tool: String,
        /// Exit status description
        status: String,
        /// Captured standard error (trimmed)
        stderr: String,
    },

    /// I/O error while running the tool
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other transfer failure reported by the service
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the dedup ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger file exists but could not be read
    #[error("failed to read ledger {path}: {source}")]
    Read {
        /// Ledger path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The ledger file is not a JSON array of identifiers
    #[error("failed to parse ledger {path}: {source}")]
    Parse {
        /// Ledger path
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// The ledger could not be persisted
    #[error("failed to write ledger {path}: {source}")]
    Write {
        /// Path being written (temp file or ledger)
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The member set could not be serialized
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[source] serde_json::Error),
}
