//! Structured Output Parsing
//!
//! Parsing of model completions into typed records.
//!
//! # Example
//!
//! ```rust
//! use quill_core::parsing::{JsonParser, OutputParser};
//!
//! let parser = JsonParser::new();
//! let value = parser.parse("```json\n{\"score\": 88}\n```").unwrap();
//! assert_eq!(value["score"], 88);
//! ```

mod json;
mod parser;

pub use json::{strip_code_fences, JsonParser};
pub use parser::{OutputParser, ParseError, ParseResult, ParserConfig};
