//! Error types for Quill operations

use crate::parsing::ParseError;

/// Result type for Quill operations
pub type Result<T> = std::result::Result<T, QuillError>;

/// Error types for the content pipeline
#[derive(Debug, thiserror::Error)]
pub enum QuillError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Text-generation service failed after transport retries
    #[error("LLM transport error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Transport {
        /// HTTP status, if the service answered at all
        status: Option<u16>,
        /// Error message
        message: String,
        /// Whether the transport layer may retry this failure
        retryable: bool,
    },

    /// Model output could not be parsed into the expected shape
    #[error("Failed to parse model output: {0}")]
    Parse(#[from] ParseError),

    /// Job store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Guideline profile lookup failed
    #[error("Guideline error: {0}")]
    Guidelines(String),

    /// No workflow with the given request id
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Status change not allowed by the lifecycle table
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Human decision does not fit the gate the workflow is waiting on
    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    /// Rejected user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl QuillError {
    /// Build a transport error
    pub fn transport(status: Option<u16>, message: impl Into<String>, retryable: bool) -> Self {
        QuillError::Transport {
            status,
            message: message.into(),
            retryable,
        }
    }

    /// Whether a transport-level retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuillError::Transport { retryable: true, .. })
    }
}

impl From<String> for QuillError {
    fn from(s: String) -> Self {
        QuillError::Other(s)
    }
}

impl From<&str> for QuillError {
    fn from(s: &str) -> Self {
        QuillError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for QuillError {
    fn from(err: anyhow::Error) -> Self {
        QuillError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display_includes_status() {
        let err = QuillError::transport(Some(503), "unavailable", true);
        assert_eq!(err.to_string(), "LLM transport error (503): unavailable");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_transport_without_status() {
        let err = QuillError::transport(None, "connection reset", true);
        assert_eq!(err.to_string(), "LLM transport error: connection reset");
    }

    #[test]
    fn test_parse_error_is_not_retryable() {
        let err: QuillError = ParseError::EmptyInput.into();
        assert!(!err.is_retryable());
    }
}
