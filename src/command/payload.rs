//! Payload templating and encoding.
//!
//! A payload goes through three steps before it is written:
//!
//! 1. `{{name}}` placeholders are substituted from the caller's parameter
//!    values, falling back to the command's declared defaults
//! 2. the pre-send script, if any, rewrites the substituted text
//! 3. the result is encoded per [`PayloadFormat`] and [`LineEnding`]

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::script::Params;

use super::types::{CommandParameter, LineEnding, PayloadFormat};

// ============================================================================
// Constants
// ============================================================================

/// `{{ name }}` placeholder.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}").expect("placeholder pattern is valid")
});

// ============================================================================
// Substitution
// ============================================================================

/// Replaces `{{name}}` placeholders.
///
/// Unknown placeholders are left in place.
pub fn substitute<'a>(
    template: &'a str,
    values: &Params,
    declared: &[CommandParameter],
) -> Cow<'a, str> {
    PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        let value = values.get(name).or_else(|| {
            declared
                .iter()
                .find(|p| p.name == name)
                .and_then(|p| p.default.as_ref())
        });

        match value {
            Some(value) => value_to_text(value),
            None => {
                debug!(parameter = name, "No value for placeholder, left as-is");
                caps[0].to_string()
            }
        }
    })
}

/// Renders a parameter value without JSON quoting for strings.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Merges declared defaults under the caller's values.
#[must_use]
pub fn resolve_params(values: &Params, declared: &[CommandParameter]) -> Params {
    let mut params = Params::new();
    for parameter in declared {
        if let Some(default) = &parameter.default {
            params.insert(parameter.name.clone(), default.clone());
        }
    }
    for (name, value) in values {
        params.insert(name.clone(), value.clone());
    }
    params
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes payload text into bytes.
///
/// # Errors
///
/// Returns [`Error::Config`] if a hex payload contains an invalid byte.
pub fn encode(text: &str, format: PayloadFormat, line_ending: LineEnding) -> Result<Vec<u8>> {
    match format {
        PayloadFormat::Text => {
            let ending = line_ending.as_bytes();
            let mut bytes = Vec::with_capacity(text.len() + ending.len());
            bytes.extend_from_slice(text.as_bytes());
            bytes.extend_from_slice(ending);
            Ok(bytes)
        }
        PayloadFormat::Hex => parse_hex(text),
    }
}

/// Parses `01 0A 0xff` style hex. Commas also separate bytes.
fn parse_hex(text: &str) -> Result<Vec<u8>> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.is_empty() || digits.len() > 2 {
                return Err(Error::config(format!("invalid hex byte '{token}' in payload")));
            }
            u8::from_str_radix(digits, 16)
                .map_err(|_| Error::config(format!("invalid hex byte '{token}' in payload")))
        })
        .collect()
}

/// Converts a pre-send script result into bytes.
///
/// A string is encoded like the original payload; an array must hold
/// integers in `0..=255` and is written as-is.
///
/// # Errors
///
/// Returns [`Error::Script`] for any other shape or an out-of-range byte.
pub fn pre_send_bytes(
    script: &str,
    value: Value,
    format: PayloadFormat,
    line_ending: LineEnding,
) -> Result<Vec<u8>> {
    match value {
        Value::String(text) => encode(&text, format, line_ending),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| {
                        Error::script(script, format!("byte {i} is not an integer in 0..=255: {item}"))
                    })
            })
            .collect(),
        other => Err(Error::script(
            script,
            format!("must return a string or an array of bytes, got {other}"),
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================
