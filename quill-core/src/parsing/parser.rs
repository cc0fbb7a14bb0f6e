//! Core parser trait and error types

use thiserror::Error;

/// Error type for parsing operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Invalid format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Valid JSON, wrong shape
    #[error("Unexpected shape: expected {expected}, got {actual}")]
    UnexpectedShape { expected: String, actual: String },

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Empty input
    #[error("Empty input")]
    EmptyInput,
}

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Trait for model output parsers
pub trait OutputParser: Send + Sync {
    /// The output type produced by this parser
    type Output;

    /// Parse the raw completion text
    fn parse(&self, raw: &str) -> ParseResult<Self::Output>;

    /// Get the parser name for debugging
    fn name(&self) -> &'static str;
}

/// Configuration for parser behavior
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Drop trailing commas before closing brackets
    pub attempt_repair: bool,
    /// Strip markdown code fences
    pub strip_code_fences: bool,
    /// Look for the first JSON value embedded in surrounding prose
    pub extract_embedded: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            attempt_repair: true,
            strip_code_fences: true,
            extract_embedded: true,
        }
    }
}
