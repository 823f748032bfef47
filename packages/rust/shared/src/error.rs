//! Error types for CareerScout.
//!
//! Library crates use [`CareerScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Most variants are recovered locally by the pipeline: a
//! [`CareerScoutError::SourceUnavailable`] downgrades to "zero records from
//! this source", a [`CareerScoutError::CacheInconsistency`] becomes a cache
//! miss. Only [`CareerScoutError::NoDataAvailable`] ends a run.

use std::path::PathBuf;

/// Top-level error type for all CareerScout operations.
#[derive(Debug, thiserror::Error)]
pub enum CareerScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during a fetch.
    #[error("network error: {0}")]
    Network(String),

    /// HTML or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input file, invalid URL, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An upstream source failed: network failure, quota exhaustion or a
    /// malformed payload.
    #[error("source {source_tag} unavailable: {message}")]
    SourceUnavailable { source_tag: String, message: String },

    /// A required field was missing or a page could not be classified.
    #[error("ambiguous extraction: {0}")]
    ExtractionAmbiguous(String),

    /// A cached embedding was corrupt or had the wrong dimension.
    #[error("embedding cache inconsistency for {job_id}: {message}")]
    CacheInconsistency { job_id: String, message: String },

    /// A capability's credentials are absent; the dependent step is skipped.
    #[error("{capability} not configured: set the {env_var} environment variable")]
    ConfigurationMissing { capability: String, env_var: String },

    /// No adapter is configured and the crawler is disabled.
    #[error("no data available: {0}")]
    NoDataAvailable(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CareerScoutError>;

impl CareerScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Mark a source as unavailable for this run.
    pub fn source_unavailable(source_tag: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_tag: source_tag.into(),
            message: msg.into(),
        }
    }

    /// A capability whose credential env var is unset.
    pub fn configuration_missing(capability: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            capability: capability.into(),
            env_var: env_var.into(),
        }
    }

    /// Whether the pipeline can recover from this error locally.
    pub fn is_source_local(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Parse { .. }
                | Self::SourceUnavailable { .. }
                | Self::ExtractionAmbiguous(_)
                | Self::CacheInconsistency { .. }
        )
    }
}
