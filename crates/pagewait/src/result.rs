//! Result and error types for pagewait.

use thiserror::Error;

/// Result type for pagewait operations
pub type PageWaitResult<T> = Result<T, PageWaitError>;

/// Errors that can occur while waiting on or reading from a page
#[derive(Debug, Error)]
pub enum PageWaitError {
    /// A wait condition was not satisfied within its budget
    #[error("{message}")]
    Timeout {
        /// Operation-specific timeout message
        message: String,
    },

    /// A retrieval target did not resolve or lacks the property
    #[error("Failed to read property '{property}' of '{selector}': {message}")]
    PropertyAccess {
        /// Selector that was queried
        selector: String,
        /// Property that was requested
        property: String,
        /// Underlying evaluation error
        message: String,
    },

    /// In-page evaluation threw
    #[error("Evaluation failed: {message}")]
    Evaluation {
        /// Error message
        message: String,
    },

    /// Host transport failure (page closed, protocol error)
    #[error("Host error: {message}")]
    Host {
        /// Error message
        message: String,
    },

    /// Caller passed an argument the operation cannot use
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PageWaitError {
    /// Build a timeout error with the given message
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Whether this error is a wait timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
