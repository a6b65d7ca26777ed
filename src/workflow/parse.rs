//! Response parsing: decode model output into a stage's expected JSON shape.
//!
//! The specs instruct every stage to answer with raw JSON, but models wrap
//! answers in Markdown fences often enough that refusing them would fail
//! real runs. The parser therefore tries the raw text first, then the first
//! fenced code block (```json or bare ```); only when both fail does it
//! give up, carrying the raw text for diagnostics.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::ParseError;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    // (?s) lets `.` cross newlines; the lazy body stops at the first
    // closing fence.
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence regex is valid")
});

/// Decode `text` into `T`, tolerating a Markdown-fenced payload.
pub fn parse<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let direct_err = match serde_json::from_str::<T>(text.trim()) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(captures) = FENCED_BLOCK.captures(text) {
        if let Ok(value) = serde_json::from_str::<T>(captures[1].trim()) {
            return Ok(value);
        }
    }

    Err(ParseError {
        detail: direct_err.to_string(),
        raw: text.to_string(),
    })
}
