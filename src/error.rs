//! Error types for objaverse-dl
//!
//! This module provides the single error type used across the library:
//! - Orchestration errors raised by the dispatcher and aggregator
//!   (`InvalidSource`, `SourceUnavailable`)
//! - Collaborator faults forwarded unchanged (network, HTTP status, I/O, archive)
//! - Input errors (malformed tables, identifiers, configuration)

use crate::types::Source;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for objaverse-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for objaverse-dl
///
/// Each variant carries enough context to name the offending input or the
/// failing source in the message shown to the user.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "processes")
        key: Option<String>,
    },

    /// Request table references sources outside the supported set
    ///
    /// Raised before any downloader is invoked.
    #[error("invalid sources: {}. must be a subset of {}", format_set(.invalid), format_set(.allowed))]
    InvalidSource {
        /// Offending source values, sorted and deduplicated
        invalid: Vec<String>,
        /// The supported source names
        allowed: Vec<String>,
    },

    /// Annotation table for a source could not be fetched or read
    #[error("source {origin} unavailable: {reason}")]
    SourceUnavailable {
        /// The source whose annotations failed
        origin: Source,
        /// Why the annotations could not be produced
        reason: String,
    },

    /// A file identifier does not have the shape its source expects
    #[error("invalid {origin} file identifier {file_identifier:?}: {reason}")]
    InvalidIdentifier {
        /// The source that rejected the identifier
        origin: Source,
        /// The rejected identifier
        file_identifier: String,
        /// What is wrong with it
        reason: String,
    },

    /// A request or annotation table could not be parsed
    #[error("invalid table: {0}")]
    InvalidTable(String),

    /// Remote answered with a non-success status that is not "not found"
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that was requested
        url: String,
        /// HTTP status code returned
        status: u16,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Repository archive could not be written
    #[error("archive error for {path}: {reason}")]
    Archive {
        /// The archive being written
        path: PathBuf,
        /// The reason archiving failed
        reason: String,
    },

    /// Interrupted by a termination signal
    #[error("interrupted")]
    Interrupted,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Wrap any error raised while producing a source's annotations
    ///
    /// Errors that already name a source are kept as they are.
    pub fn source_unavailable(origin: Source, err: Error) -> Self {
        match err {
            Error::SourceUnavailable { .. } => err,
            other => Error::SourceUnavailable {
                origin,
                reason: other.to_string(),
            },
        }
    }
}

fn format_set(values: &[String]) -> String {
    format!("{{{}}}", values.join(", "))
}
