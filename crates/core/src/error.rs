//! Tracking error model.

use thiserror::Error;

/// Result type used across the tracking engine.
pub type TrackingResult<T> = Result<T, TrackingError>;

/// Tracking engine error.
///
/// The variants map 1:1 onto what callers see at the HTTP boundary. Only
/// `BackendUnavailable` is safe to retry; the others are deterministic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackingError {
    /// A run, job or pipeline key is absent (never written, or expired).
    #[error("not found: {0}")]
    NotFound(String),

    /// A request failed validation (malformed body, out-of-range value).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backing store could not be reached or timed out.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A stored record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl TrackingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}
