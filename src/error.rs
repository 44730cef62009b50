//! Unified error types for Chaser-Capture

use std::time::Duration;
use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error tag, stable across message changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Timeout,
    ElementNotFound,
    IndexOutOfRange,
    Evaluation,
    Navigation,
    Protocol,
    Io,
    Serialization,
    Configuration,
    Internal,
}

/// Unified error type for Chaser-Capture
#[derive(Error, Debug)]
pub enum Error {
    /// Transport or discovery endpoint unreachable, or connection lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Deadline expired
    #[error("Operation timeout after {elapsed_ms}ms: {message}")]
    Timeout { message: String, elapsed_ms: u64 },

    /// Selector resolved to no node
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Positional target index outside the live target list
    #[error("Target index {index} out of range ({count} targets open)")]
    IndexOutOfRange { index: usize, count: usize },

    /// Script threw inside the page
    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    /// Browser refused the navigation
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// CDP protocol error response
    #[error("CDP error: {0}")]
    Cdp(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Error::Connection(msg.into())
    }

    /// Create a new timeout error with no meaningful elapsed time
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout {
            message: msg.into(),
            elapsed_ms: 0,
        }
    }

    /// Create a new timeout error carrying the time spent waiting
    pub fn timeout_after<S: Into<String>>(msg: S, elapsed: Duration) -> Self {
        Error::Timeout {
            message: msg.into(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Create a new element not found error
    pub fn element_not_found<S: Into<String>>(selector: S) -> Self {
        Error::ElementNotFound(selector.into())
    }

    /// Create a new index out of range error
    pub fn index_out_of_range(index: usize, count: usize) -> Self {
        Error::IndexOutOfRange { index, count }
    }

    /// Create a new evaluation error
    pub fn evaluation<S: Into<String>>(msg: S) -> Self {
        Error::Evaluation(msg.into())
    }

    /// Create a new navigation failed error
    pub fn navigation<S: Into<String>>(msg: S) -> Self {
        Error::Navigation(msg.into())
    }

    /// Create a new CDP error
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Tag of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) => ErrorKind::Connection,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::ElementNotFound(_) => ErrorKind::ElementNotFound,
            Error::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Error::Evaluation(_) => ErrorKind::Evaluation,
            Error::Navigation(_) => ErrorKind::Navigation,
            Error::Cdp(_) => ErrorKind::Protocol,
            Error::Io(_) => ErrorKind::Io,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Connection)
    }

    /// Milliseconds spent before a timeout fired
    pub fn elapsed_ms(&self) -> Option<u64> {
        match self {
            Error::Timeout { elapsed_ms, .. } => Some(*elapsed_ms),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Connection(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Connection(format!("WebSocket error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(Error::connection("gone").is_retryable());
        assert!(Error::timeout("slow").is_retryable());
        assert!(!Error::element_not_found("#x").is_retryable());
        assert!(!Error::index_out_of_range(3, 1).is_retryable());
        assert!(!Error::evaluation("boom").is_retryable());
    }

    #[test]
    fn test_timeout_carries_elapsed() {
        let err = Error::timeout_after("waiting", Duration::from_millis(1250));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.elapsed_ms(), Some(1250));
        assert!(err.to_string().contains("1250ms"));
    }

    #[test]
    fn test_index_message() {
        let err = Error::index_out_of_range(4, 2);
        assert_eq!(err.to_string(), "Target index 4 out of range (2 targets open)");
    }
}
