//! Framing configuration.
//!
//! [`FramingConfig`] is the persisted, per-session description of how the
//! inbound byte stream is cut into frames. Field names match the project
//! export format:
//!
//! ```json
//! {
//!   "strategy": "DELIMITER",
//!   "delimiter": "\\r\\n",
//!   "timeout": 50,
//!   "prefixLengthSize": 2,
//!   "byteOrder": "BE",
//!   "script": ""
//! }
//! ```
//!
//! Malformed parameters never fail a session: an empty delimiter degrades
//! to pass-through, an unparseable hex delimiter is used as literal text and
//! an out-of-range prefix width is clamped.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Smallest supported length-prefix width in bytes.
pub const MIN_PREFIX_LENGTH_SIZE: u8 = 1;

/// Largest supported length-prefix width in bytes.
pub const MAX_PREFIX_LENGTH_SIZE: u8 = 8;

/// Default debounce interval for the timeout strategy.
pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 100;

// ============================================================================
// Enums
// ============================================================================

/// Algorithm deciding where one frame ends and the next begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FramingStrategy {
    /// Every push is one frame.
    #[default]
    None,
    /// Frames end at a delimiter sequence.
    Delimiter,
    /// Frames end after a period of silence.
    Timeout,
    /// Frames carry a length header.
    PrefixLength,
    /// Frames are cut by a user script.
    Script,
}

/// Byte order of the length prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Little endian.
    #[default]
    #[serde(rename = "LE")]
    Little,
    /// Big endian.
    #[serde(rename = "BE")]
    Big,
}

impl ByteOrder {
    /// Reads an unsigned integer of `bytes.len()` (at most 8) bytes.
    #[must_use]
    pub fn read_uint(self, bytes: &[u8]) -> u64 {
        let fold = |acc: u64, &b: &u8| (acc << 8) | u64::from(b);
        match self {
            Self::Big => bytes.iter().fold(0, fold),
            Self::Little => bytes.iter().rev().fold(0, fold),
        }
    }
}

// ============================================================================
// FramingConfig
// ============================================================================

/// Per-session framing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FramingConfig {
    /// Active strategy.
    pub strategy: FramingStrategy,

    /// Delimiter as escapes (`\n`, `\r`, `\t`) or space-separated hex bytes.
    pub delimiter: String,

    /// Debounce interval for [`FramingStrategy::Timeout`].
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,

    /// Width of the length prefix (clamped to 1..=8).
    pub prefix_length_size: u8,

    /// Byte order of the length prefix.
    pub byte_order: ByteOrder,

    /// Name of the framing script for [`FramingStrategy::Script`].
    pub script: String,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            strategy: FramingStrategy::None,
            delimiter: "\\n".to_string(),
            timeout_ms: DEFAULT_FRAME_TIMEOUT_MS,
            prefix_length_size: MIN_PREFIX_LENGTH_SIZE,
            byte_order: ByteOrder::Little,
            script: String::new(),
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl FramingConfig {
    /// Pass-through framing.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Delimiter framing.
    #[must_use]
    pub fn delimiter(delimiter: impl Into<String>) -> Self {
        Self {
            strategy: FramingStrategy::Delimiter,
            delimiter: delimiter.into(),
            ..Self::default()
        }
    }

    /// Silence-debounced framing.
    #[must_use]
    pub fn timeout(timeout_ms: u64) -> Self {
        Self {
            strategy: FramingStrategy::Timeout,
            timeout_ms,
            ..Self::default()
        }
    }

    /// Length-prefixed framing.
    #[must_use]
    pub fn prefix_length(size: u8, byte_order: ByteOrder) -> Self {
        Self {
            strategy: FramingStrategy::PrefixLength,
            prefix_length_size: size,
            byte_order,
            ..Self::default()
        }
    }

    /// Script-driven framing.
    #[must_use]
    pub fn script(name: impl Into<String>) -> Self {
        Self {
            strategy: FramingStrategy::Script,
            script: name.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Derived Parameters
// ============================================================================

impl FramingConfig {
    /// Delimiter bytes, or `None` when the delimiter is empty.
    #[must_use]
    pub fn delimiter_bytes(&self) -> Option<Vec<u8>> {
        let bytes = parse_delimiter(&self.delimiter);
        (!bytes.is_empty()).then_some(bytes)
    }

    /// Prefix width clamped to the supported range.
    #[inline]
    #[must_use]
    pub fn clamped_prefix_size(&self) -> usize {
        usize::from(
            self.prefix_length_size
                .clamp(MIN_PREFIX_LENGTH_SIZE, MAX_PREFIX_LENGTH_SIZE),
        )
    }

    /// Debounce interval, at least one millisecond.
    #[inline]
    #[must_use]
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

// ============================================================================
// Import / Export
// ============================================================================

impl FramingConfig {
    /// Parses a config from its persisted JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the config to its persisted JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Delimiter Parsing
// ============================================================================

/// Parses a delimiter literal into bytes.
///
/// Accepted forms:
///
/// | Input | Bytes |
/// |-------|-------|
/// | `\r\n` | `0D 0A` |
/// | `0D 0A` or `0x0D 0x0A` | `0D 0A` |
/// | `0x03` | `03` |
/// | `,` | `2C` |
///
/// Hex form needs at least two tokens or a `0x` prefix; anything that does
/// not parse as hex is treated as text with escapes.
#[must_use]
pub fn parse_delimiter(input: &str) -> Vec<u8> {
    parse_hex_bytes(input).unwrap_or_else(|| unescape(input))
}

/// Parses space-separated hex bytes, or `None` if `input` is not hex form.
fn parse_hex_bytes(input: &str) -> Option<Vec<u8>> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    let prefixed = tokens
        .iter()
        .all(|t| t.starts_with("0x") || t.starts_with("0X"));
    if tokens.len() < 2 && !prefixed {
        return None;
    }

    tokens
        .iter()
        .map(|token| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.is_empty() || digits.len() > 2 {
                return None;
            }
            u8::from_str_radix(digits, 16).ok()
        })
        .collect()
}

/// Expands `\n`, `\r`, `\t`, `\0` and `\\`; other backslashes stay literal.
fn unescape(input: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut buf = [0u8; 4];

    while let Some(c) = chars.next() {
        if c == '\\' {
            let replacement = match chars.peek() {
                Some('n') => Some(b'\n'),
                Some('r') => Some(b'\r'),
                Some('t') => Some(b'\t'),
                Some('0') => Some(0),
                Some('\\') => Some(b'\\'),
                _ => None,
            };
            if let Some(byte) = replacement {
                chars.next();
                out.push(byte);
                continue;
            }
        }
        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    out
}

// ============================================================================
// Tests
// ============================================================================
