//! Error types for the Cloudey cost cache
//!
//! Provides a unified error type, domain-specific error variants, and an
//! [`ErrorKind`] classification so callers can tell "store unreachable" from
//! "malformed input" without inspecting message text.

use thiserror::Error;

/// Result type alias using CloudeyError
pub type Result<T> = std::result::Result<T, CloudeyError>;

/// Unified error type for cost cache operations
#[derive(Debug, Error)]
pub enum CloudeyError {
    // Billing API errors
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    // Storage errors (either tier)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // Record validation errors
    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] RecordError),

    // Operation not valid for the period's status
    #[error("Period {period} not allowed here: {reason}")]
    PeriodNotAllowed { period: String, reason: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Storage backend errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{store} unavailable: {message}")]
    Unavailable { store: &'static str, message: String },

    #[error("{store} exhausted: {message}")]
    Exhausted { store: &'static str, message: String },

    #[error("Stored value could not be decoded: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn unavailable(store: &'static str, message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            store,
            message: message.into(),
        }
    }

    pub fn exhausted(store: &'static str, message: impl Into<String>) -> Self {
        StoreError::Exhausted {
            store,
            message: message.into(),
        }
    }
}

/// Cost record validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("service is required")]
    MissingService,

    #[error("resource_id is required")]
    MissingResourceId,

    #[error("record belongs to period {actual}, expected {expected}")]
    PeriodMismatch { expected: String, actual: String },

    #[error("invalid period key: {0}")]
    InvalidPeriod(String),

    #[error("cost amount is not a finite number")]
    NonFiniteAmount,
}

/// Coarse error category for branching at call sites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UpstreamUnavailable,
    CacheUnavailable,
    StoreExhausted,
    MalformedRecord,
    InvalidRequest,
    Internal,
}

impl CloudeyError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudeyError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            CloudeyError::Store(StoreError::Unavailable { .. }) => ErrorKind::CacheUnavailable,
            CloudeyError::Store(StoreError::Exhausted { .. }) => ErrorKind::StoreExhausted,
            CloudeyError::Store(StoreError::Serialization(_)) => ErrorKind::Internal,
            CloudeyError::MalformedRecord(_) => ErrorKind::MalformedRecord,
            CloudeyError::PeriodNotAllowed { .. } | CloudeyError::Config(_) => {
                ErrorKind::InvalidRequest
            }
            CloudeyError::Serialization(_) | CloudeyError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Store exhaustion has no fallback path
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::StoreExhausted
    }
}

impl From<serde_json::Error> for CloudeyError {
    fn from(err: serde_json::Error) -> Self {
        CloudeyError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for CloudeyError {
    fn from(err: anyhow::Error) -> Self {
        CloudeyError::Internal(err.to_string())
    }
}
