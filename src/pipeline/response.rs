//! Model-output cleanup: raw completion text → JSON object.
//!
//! Even in JSON mode, local models regularly wrap their answer in
//! ` ```json ... ``` ` fences, prepend "Here is the extracted data:", or leak
//! zero-width characters copied from the PDF text layer. These rules recover
//! the object without guessing at content:
//!
//! 1. Trim whitespace and invisible Unicode (BOM, zero-width spaces, soft
//!    hyphens) from both ends; characters inside the answer are kept
//! 2. Strip an outer code fence
//! 3. Parse; if that fails, parse the span from the first `{` to the last `}`
//!
//! Anything still unparseable, or parseable but not an object, is a
//! [`BackendError::MalformedOutput`].

use crate::error::BackendError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Longest prefix of the raw output quoted in error messages.
const SNIPPET_CHARS: usize = 200;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Parse a model completion into a JSON object.
pub fn parse_model_output(raw: &str) -> Result<Value, BackendError> {
    let cleaned = strip_fences(trim_invisible(raw));

    if cleaned.is_empty() {
        return Err(BackendError::MalformedOutput {
            detail: "empty response".into(),
        });
    }

    let value = match serde_json::from_str::<Value>(cleaned) {
        Ok(v) => v,
        Err(first_err) => match outermost_object(cleaned) {
            Some(inner) => serde_json::from_str::<Value>(inner).map_err(|e| {
                BackendError::MalformedOutput {
                    detail: format!("{e} in: {}", snippet(raw)),
                }
            })?,
            None => {
                return Err(BackendError::MalformedOutput {
                    detail: format!("{first_err} in: {}", snippet(raw)),
                })
            }
        },
    };

    if value.is_object() {
        Ok(value)
    } else {
        Err(BackendError::MalformedOutput {
            detail: format!("expected a JSON object, got: {}", snippet(raw)),
        })
    }
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

fn trim_invisible(input: &str) -> &str {
    input.trim_matches(|c: char| c.is_whitespace() || is_invisible(c))
}

fn strip_fences(input: &str) -> &str {
    match RE_OUTER_FENCES.captures(input).and_then(|c| c.get(1)) {
        Some(m) => trim_invisible(m.as_str()),
        None => input,
    }
}

fn outermost_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (end > start).then(|| &input[start..=end])
}

fn snippet(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= SNIPPET_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(SNIPPET_CHARS).collect();
        format!("{head}…")
    }
}
