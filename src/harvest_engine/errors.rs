//! Error types for harvest operations
//!
//! Every failure that crosses a component seam is a `HarvestError`. The
//! retry policy decides retriability from `ErrorKind`, never from the
//! message text.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for harvest operations
pub type HarvestResult<T> = Result<T, HarvestError>;

/// Closed classification of failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network timeout, missing element, navigation error, rate limiting
    Transient,
    /// No pooled resource became available in time
    ResourceExhausted,
    /// Payload is missing required fields or is malformed
    SchemaInvalid,
    /// Invalid run configuration, detected before any work starts
    ConfigInvalid,
    /// Ledger or filesystem cannot be reached at all
    Store,
}

/// Error types for harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Retriable failure while talking to the portal
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The portal signalled rate limiting
    #[error("Rate limited by portal (retry after {retry_after:?})")]
    RateLimited { retry_after: Duration },

    /// Acquire timed out waiting for a pooled resource
    #[error("Resource pool exhausted: no resource available within {timeout:?}")]
    PoolExhausted { timeout: Duration },

    /// The pool was shut down while waiting
    #[error("Resource pool is shut down")]
    PoolClosed,

    /// Payload failed structural validation
    #[error("Schema error: {0}")]
    SchemaInvalid(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Ledger store failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] sqlx::Error),

    /// Filesystem failure while persisting records
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON (de)serialization failure while persisting records
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarvestError {
    /// Shorthand for a transient error from any displayable cause
    pub fn transient(cause: impl std::fmt::Display) -> Self {
        Self::Transient(cause.to_string())
    }

    /// Shorthand for a schema error
    pub fn schema(cause: impl std::fmt::Display) -> Self {
        Self::SchemaInvalid(cause.to_string())
    }

    /// Shorthand for a configuration error
    pub fn config(cause: impl std::fmt::Display) -> Self {
        Self::InvalidConfiguration(cause.to_string())
    }

    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) | Self::RateLimited { .. } => ErrorKind::Transient,
            Self::PoolExhausted { .. } | Self::PoolClosed => ErrorKind::ResourceExhausted,
            Self::SchemaInvalid(_) | Self::Serialization(_) => ErrorKind::SchemaInvalid,
            Self::InvalidConfiguration(_) => ErrorKind::ConfigInvalid,
            Self::Ledger(_) | Self::Storage(_) => ErrorKind::Store,
        }
    }

    /// Whether the retry policy may attempt the operation again
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Wait hint attached to rate-limit signals
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for HarvestError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} keeps the context chain
        Self::Transient(format!("{err:#}"))
    }
}
