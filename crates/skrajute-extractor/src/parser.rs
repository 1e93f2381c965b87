//! Decode model output into a page of promotions
//!
//! Models wrap JSON in code fences, add commentary around it, and sometimes
//! use typographic quotes as delimiters. The parser strips fences, tries a
//! direct decode, and falls back to the first balanced `{...}` object.

use crate::types::ParsedPage;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use skrajute_domain::{PageMeta, Promotion};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+\-]*").expect("valid regex"));

/// Why a response could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing left after stripping fences and whitespace
    #[error("empty response")]
    Empty,

    /// No `{` anywhere in the response
    #[error("no JSON object found in response")]
    NoJsonObject,

    /// An object opens but never closes
    #[error("unbalanced braces: object opened at byte {0} is never closed")]
    Unbalanced(usize),

    /// JSON was found but does not fit the page schema
    #[error("response does not match the page schema: {0}")]
    Schema(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    page_meta: Option<PageMeta>,
    #[serde(default)]
    promotions: Option<Vec<Promotion>>,
}

/// Parse one model response
///
/// Never panics. Typographic quotes are only rewritten when the response does
/// not decode as-is, so quotes inside product names survive.
pub fn parse_response(raw: &str) -> Result<ParsedPage, ParseError> {
    let stripped = FENCE.replace_all(raw, "");
    let text = stripped.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let straightened = straighten_quotes(text);
    let mut candidates = vec![text];
    if straightened != text {
        candidates.push(straightened.as_str());
    }

    for candidate in &candidates {
        if let Ok(page) = decode(candidate) {
            return Ok(page);
        }
    }

    let mut last_error = ParseError::NoJsonObject;
    for candidate in &candidates {
        match balanced_object(candidate) {
            Ok(object) => match decode(object) {
                Ok(page) => {
                    debug!(
                        skipped = candidate.len() - object.len(),
                        "Recovered JSON object from surrounding text"
                    );
                    return Ok(page);
                }
                Err(e) => last_error = e,
            },
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}

fn decode(text: &str) -> Result<ParsedPage, ParseError> {
    let schema = |e: serde_json::Error| ParseError::Schema(e.to_string());
    let value: Value = serde_json::from_str(text).map_err(schema)?;
    match value {
        Value::Object(_) => {
            let envelope: Envelope = serde_json::from_value(value).map_err(schema)?;
            Ok(ParsedPage {
                page_meta: envelope.page_meta.unwrap_or_default(),
                promotions: envelope.promotions.unwrap_or_default(),
            })
        }
        Value::Array(_) => Ok(ParsedPage {
            page_meta: PageMeta::default(),
            promotions: serde_json::from_value(value).map_err(schema)?,
        }),
        other => Err(ParseError::Schema(format!(
            "expected an object, found {}",
            json_kind(&other)
        ))),
    }
}

/// Slice from the first `{` to its matching `}`
///
/// Braces inside string literals do not count towards nesting.
fn balanced_object(text: &str) -> Result<&str, ParseError> {
    let start = text.find('{').ok_or(ParseError::NoJsonObject)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    Err(ParseError::Unbalanced(start))
}

fn straighten_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            other => other,
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
