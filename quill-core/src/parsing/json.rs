//! JSON parser for model completions
//!
//! Models routinely wrap JSON in markdown fences or add a sentence of
//! preamble. This parser peels those layers off before handing the text to
//! `serde_json`. It deliberately does not rewrite quotes: marketing copy is
//! full of apostrophes.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

use super::parser::{OutputParser, ParseError, ParseResult, ParserConfig};

static WRAPPING_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*```[\w-]*[ \t]*\r?\n([\s\S]*?)\r?\n?[ \t]*```\s*$")
        .expect("valid fence regex")
});

static EMBEDDED_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```[\w-]*[ \t]*\r?\n([\s\S]*?)\r?\n?[ \t]*```").expect("valid fence regex")
});

static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid trailing comma regex"));

/// Strip a markdown code fence that wraps the whole input.
///
/// Fenced blocks inside longer text are left alone, so an article with a
/// code sample keeps its prose. Returns the trimmed input when there is no
/// wrapping fence.
pub fn strip_code_fences(input: &str) -> &str {
    match WRAPPING_FENCE_RE.captures(input).and_then(|caps| caps.get(1)) {
        // A body holding another fence means the input opens and closes with
        // two separate blocks
        Some(body) if !body.as_str().contains("```") => body.as_str().trim(),
        _ => input.trim(),
    }
}

/// JSON parser with fence stripping and light repair
#[derive(Debug, Clone)]
pub struct JsonParser {
    config: ParserConfig,
}

impl JsonParser {
    /// Create a new JSON parser with default config
    pub fn new() -> Self {
        Self {
            config: ParserConfig::default(),
        }
    }

    /// Parse and deserialize into `T`.
    pub fn parse_as<T: DeserializeOwned>(&self, raw: &str) -> ParseResult<T> {
        let value = self.parse(raw)?;
        serde_json::from_value(value).map_err(|e| ParseError::InvalidFormat(e.to_string()))
    }

    /// Parse, requiring a top-level JSON array.
    ///
    /// An object with exactly one array-valued field (`{"concepts": [...]}`)
    /// is unwrapped, since models often add a wrapper key even when asked not
    /// to.
    pub fn parse_array(&self, raw: &str) -> ParseResult<Vec<serde_json::Value>> {
        match self.parse(raw)? {
            serde_json::Value::Array(items) => Ok(items),
            serde_json::Value::Object(map) => {
                let mut arrays = map.into_iter().filter_map(|(_, v)| match v {
                    serde_json::Value::Array(items) => Some(items),
                    _ => None,
                });
                match (arrays.next(), arrays.next()) {
                    (Some(items), None) => Ok(items),
                    _ => Err(ParseError::UnexpectedShape {
                        expected: "array".to_string(),
                        actual: "object".to_string(),
                    }),
                }
            }
            other => Err(ParseError::UnexpectedShape {
                expected: "array".to_string(),
                actual: json_kind(&other).to_string(),
            }),
        }
    }

    /// Parse the first balanced JSON object/array in surrounding text.
    ///
    /// Every `{` or `[` is tried as a start position in turn, so a stray
    /// bracket in the preamble does not hide the value that follows it.
    fn extract_embedded(&self, input: &str) -> Option<serde_json::Value> {
        input
            .char_indices()
            .filter(|(_, c)| matches!(c, '{' | '['))
            .filter_map(|(start, _)| balanced_prefix(&input[start..]))
            .find_map(|candidate| self.try_parse(candidate))
    }

    fn try_parse(&self, candidate: &str) -> Option<serde_json::Value> {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
            return Some(value);
        }
        if self.config.attempt_repair {
            let repaired = TRAILING_COMMA_RE.replace_all(candidate, "$1");
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&repaired) {
                return Some(value);
            }
        }
        None
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputParser for JsonParser {
    type Output = serde_json::Value;

    fn parse(&self, raw: &str) -> ParseResult<Self::Output> {
        if raw.trim().is_empty() {
            return Err(ParseError::EmptyInput);
        }

        let input = if self.config.strip_code_fences {
            strip_code_fences(raw)
        } else {
            raw.trim()
        };

        if let Some(value) = self.try_parse(input) {
            return Ok(value);
        }

        if self.config.extract_embedded {
            let fenced = EMBEDDED_FENCE_RE
                .captures_iter(input)
                .filter_map(|caps| caps.get(1))
                .find_map(|body| self.try_parse(body.as_str().trim()));
            if let Some(value) = fenced.or_else(|| self.extract_embedded(input)) {
                return Ok(value);
            }
        }

        let preview: String = input.chars().take(80).collect();
        Err(ParseError::InvalidFormat(format!(
            "no JSON value found in model output: {:?}",
            preview
        )))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// The balanced bracket expression at the start of `text`, if it closes
fn balanced_prefix(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_array() {
        let parser = JsonParser::new();
        let items = parser
            .parse_array(r#"[{"title": "A", "summary": "a"}]"#)
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["title"], "A");
    }

    #[test]
    fn test_parse_with_code_fence() {
        let parser = JsonParser::new();
        let input = "```json\n[{\"title\": \"A\"}]\n```";
        let items = parser.parse_array(input).unwrap();
        assert_eq!(items[0]["title"], "A");
    }

    #[test]
    fn test_parse_with_bare_fence() {
        let parser = JsonParser::new();
        let input = "```\n{\"score\": 80, \"issues\": []}\n```";
        let value = parser.parse(input).unwrap();
        assert_eq!(value["score"], 80);
    }

    #[test]
    fn test_apostrophes_survive() {
        let parser = JsonParser::new();
        let value = parser
            .parse(r#"{"title": "Don't miss what's next"}"#)
            .unwrap();
        assert_eq!(value["title"], "Don't miss what's next");
    }

    #[test]
    fn test_parse_trailing_comma() {
        let parser = JsonParser::new();
        let items = parser.parse_array(r#"[{"title": "A"},]"#).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_parse_json_in_prose() {
        let parser = JsonParser::new();
        let value = parser
            .parse(r#"Sure! Here you go: {"score": 72, "issues": ["tone"]} Hope it helps."#)
            .unwrap();
        assert_eq!(value["score"], 72);
    }

    #[test]
    fn test_unwraps_single_array_field() {
        let parser = JsonParser::new();
        let items = parser
            .parse_array(r#"{"concepts": [{"title": "A"}, {"title": "B"}]}"#)
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_array_expected_but_string_given() {
        let parser = JsonParser::new();
        let err = parser.parse_array(r#""just a string""#).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedShape { .. }));
    }

    #[test]
    fn test_not_json() {
        let parser = JsonParser::new();
        assert!(matches!(
            parser.parse("not json"),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_empty_input() {
        let parser = JsonParser::new();
        assert!(matches!(parser.parse("   "), Err(ParseError::EmptyInput)));
    }

    #[test]
    fn test_parse_as_typed() {
        #[derive(serde::Deserialize)]
        struct Review {
            score: f64,
            issues: Vec<String>,
        }

        let parser = JsonParser::new();
        let review: Review = parser
            .parse_as("```json\n{\"score\": 91.5, \"issues\": [\"typo\"]}\n```")
            .unwrap();
        assert_eq!(review.score, 91.5);
        assert_eq!(review.issues, vec!["typo".to_string()]);
    }

    #[test]
    fn test_strip_code_fences_passthrough() {
        assert_eq!(strip_code_fences("  plain text  "), "plain text");
    }

    #[test]
    fn test_inner_fence_is_not_stripped() {
        let article = "# Title\n\nIntro.\n\n```python\nprint('hi')\n```\n\nClosing.";
        assert_eq!(strip_code_fences(article), article);
        assert_eq!(strip_code_fences("```markdown\n# Title\n\nBody\n```\n"), "# Title\n\nBody");

        let bookended = "```sh\nmake\n```\n\nProse between.\n\n```sh\nmake test\n```";
        assert_eq!(strip_code_fences(bookended), bookended);
    }

    #[test]
    fn test_fenced_json_after_prose() {
        let parser = JsonParser::new();
        let input = "Here are the concepts:\n```json\n[{\"title\": \"A\"}]\n```\nEnjoy.";
        let items = parser.parse_array(input).unwrap();
        assert_eq!(items[0]["title"], "A");
    }

    #[test]
    fn test_skips_bracketed_prose_before_json() {
        let parser = JsonParser::new();
        let items = parser
            .parse_array(r#"Ideas [v2]: [{"title": "A"}, {"title": "B"}]"#)
            .unwrap();
        assert_eq!(items.len(), 2);
    }
}
