//! Locating JSON objects inside free-form model output.
//!
//! Generation responses often wrap the requested JSON in prose or code
//! fences. The scanner walks the text once, tracking brace depth while
//! ignoring braces inside string literals, and yields every top-level
//! balanced `{...}` span in order. [`extract_json_object`] returns the first
//! span that parses as a JSON object.

use serde_json::{Map, Value};
use thiserror::Error;

/// Why no JSON object could be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonExtractError {
    /// The text contains no opening brace at all.
    #[error("No JSON object in output")]
    NoObject,

    /// An opening brace was never closed.
    #[error("Unterminated JSON object starting at byte {start}")]
    Unterminated {
        /// Byte offset of the unclosed brace.
        start: usize,
    },

    /// Balanced spans were found but none parsed as a JSON object.
    #[error("No valid JSON object in output: {reason}")]
    Invalid {
        /// Parse error of the first candidate.
        reason: String,
    },
}

/// Iterator over top-level balanced `{...}` spans.
#[derive(Debug, Clone)]
pub struct BalancedObjects<'a> {
    text: &'a str,
    pos: usize,
    unterminated: Option<usize>,
}

impl<'a> BalancedObjects<'a> {
    /// Creates a scanner over `text`.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            unterminated: None,
        }
    }

    /// Byte offset of an opening brace that was never closed, once the
    /// scanner has hit it.
    #[must_use]
    pub fn unterminated(&self) -> Option<usize> {
        self.unterminated
    }
}

impl<'a> Iterator for BalancedObjects<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let bytes = self.text.as_bytes();
        let start = self.pos + self.text[self.pos..].find('{')?;

        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &b) in bytes[start..].iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = start + offset + 1;
                        self.pos = end;
                        return Some(&self.text[start..end]);
                    }
                }
                _ => {}
            }
        }

        self.unterminated = Some(start);
        self.pos = self.text.len();
        None
    }
}

/// Extracts the first balanced span that parses as a JSON object.
///
/// Spans that balance but fail to parse (prose like `{see above}`) are
/// skipped in favour of later candidates.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, JsonExtractError> {
    let mut scanner = BalancedObjects::new(text);
    let mut first_error: Option<String> = None;

    for span in scanner.by_ref() {
        match serde_json::from_str::<Value>(span) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(_) => {}
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    match (first_error, scanner.unterminated()) {
        (Some(reason), _) => Err(JsonExtractError::Invalid { reason }),
        (None, Some(start)) => Err(JsonExtractError::Unterminated { start }),
        (None, None) => Err(JsonExtractError::NoObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extracts_object_wrapped_in_prose() {
        let text = "Here is the report:\n```json\n{\"title\": \"EV\", \"n\": 1}\n```\nThanks!";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map.get("title"), Some(&Value::from("EV")));
    }

    #[test]
    fn test_nested_objects_stay_whole() {
        let text = r#"{"a": {"b": {"c": 1}}, "d": [ {"e": 2} ]} trailing"#;
        let spans: Vec<_> = BalancedObjects::new(text).collect();
        assert_eq!(spans, vec![r#"{"a": {"b": {"c": 1}}, "d": [ {"e": 2} ]}"#]);
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"summary": "use } and { freely", "q": "say \"}\""}"#;
        let map = extract_json_object(text).unwrap();
        assert_eq!(map.get("summary"), Some(&Value::from("use } and { freely")));
    }

    #[test]
    fn test_multiple_objects_first_wins() {
        let text = r#"{"first": 1} and {"second": 2}"#;
        let map = extract_json_object(text).unwrap();
        assert!(map.contains_key("first"));
        assert!(!map.contains_key("second"));
    }

    #[test]
    fn test_skips_prose_braces() {
        let text = r#"As noted {see above}, the answer is {"title": "ok"}"#;
        let map = extract_json_object(text).unwrap();
        assert_eq!(map.get("title"), Some(&Value::from("ok")));
    }

    #[test]
    fn test_no_braces() {
        assert_eq!(
            extract_json_object("I could not produce a report."),
            Err(JsonExtractError::NoObject)
        );
    }

    #[test]
    fn test_unterminated_object() {
        assert_eq!(
            extract_json_object(r#"Result: {"title": "cut off"#),
            Err(JsonExtractError::Unterminated { start: 8 })
        );
    }

    #[test]
    fn test_invalid_only_candidates() {
        let err = extract_json_object("{not json}").unwrap_err();
        assert!(matches!(err, JsonExtractError::Invalid { .. }));
    }
}
