//! Tolerant JSON extraction for LLM responses.
//!
//! Model replies arrive as text that may be raw JSON, fenced with a
//! language tag, fenced without one, or wrapped in prose. The extractor
//! tries each shape in order and only then rejects, so every JSON-consuming
//! agent goes through one code path with one failure mode.

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum JsonExtractError {
    #[error("empty response, nothing to parse")]
    #[diagnostic(code(quillweave::json::empty))]
    Empty,

    #[error("no JSON value found in response")]
    #[diagnostic(
        code(quillweave::json::unparseable),
        help("Tried raw, fenced, and outermost-braces forms; the response holds no valid JSON.")
    )]
    Unparseable,
}

/// Strip a leading/trailing markdown fence, with or without a language tag.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line if present.
    let rest = match rest.split_once('\n') {
        Some((_tag, body)) => body,
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Locate the outermost `{...}` or `[...]` span, ignoring brackets inside
/// string literals.
fn outermost_span(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find(['{', '['])?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract a JSON value from an LLM response.
///
/// Order of attempts: fenced content as-is, then the outermost braces/
/// brackets span of the fenced content, then of the raw text.
pub fn extract_json(text: &str) -> Result<Value, JsonExtractError> {
    if text.trim().is_empty() {
        return Err(JsonExtractError::Empty);
    }
    let unfenced = strip_fence(text);
    if let Ok(v) = serde_json::from_str::<Value>(unfenced) {
        return Ok(v);
    }
    for candidate in [outermost_span(unfenced), outermost_span(text)]
        .into_iter()
        .flatten()
    {
        if let Ok(v) = serde_json::from_str::<Value>(candidate) {
            return Ok(v);
        }
    }
    Err(JsonExtractError::Unparseable)
}

/// Extract a JSON object; non-objects are rejected.
pub fn extract_json_object(text: &str) -> Result<serde_json::Map<String, Value>, JsonExtractError> {
    match extract_json(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(JsonExtractError::Unparseable),
    }
}

/// Extract a JSON array; a bare object is wrapped into a one-element array
/// so prompts that "usually" return lists degrade gracefully.
pub fn extract_json_array(text: &str) -> Result<Vec<Value>, JsonExtractError> {
    match extract_json(text)? {
        Value::Array(items) => Ok(items),
        obj @ Value::Object(_) => Ok(vec![obj]),
        _ => Err(JsonExtractError::Unparseable),
    }
}

/// Convenience: extract and deserialize into a typed value.
pub fn extract_typed<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, JsonExtractError> {
    let value = extract_json(text)?;
    serde_json::from_value(value).map_err(|_| JsonExtractError::Unparseable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_raw_json() {
        let v = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn parses_fenced_with_tag() {
        let v = extract_json("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn parses_fenced_without_tag() {
        let v = extract_json("```\n[1, 2]\n```").unwrap();
        assert_eq!(v, json!([1, 2]));
    }

    #[test]
    fn rescues_json_wrapped_in_prose() {
        let v = extract_json("Sure! Here is the result: {\"ok\": true} hope it helps").unwrap();
        assert_eq!(v, json!({"ok": true}));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let v = extract_json(r#"prefix {"text": "a } b { c"} suffix"#).unwrap();
        assert_eq!(v, json!({"text": "a } b { c"}));
    }

    #[test]
    fn empty_input_is_a_distinct_error() {
        assert!(matches!(extract_json("   "), Err(JsonExtractError::Empty)));
    }

    #[test]
    fn array_helper_wraps_single_object() {
        let items = extract_json_array(r#"{"gap": "x"}"#).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            extract_json("no json here at all"),
            Err(JsonExtractError::Unparseable)
        ));
    }
}
