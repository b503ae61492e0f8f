//! Chunk and frame value types.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ============================================================================
// TimedChunk
// ============================================================================

/// One arrival event from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedChunk {
    /// Raw bytes as read.
    pub bytes: Vec<u8>,
    /// Arrival time in milliseconds.
    pub timestamp_ms: u64,
}

impl TimedChunk {
    /// Creates a chunk.
    #[inline]
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>, timestamp_ms: u64) -> Self {
        Self {
            bytes: bytes.into(),
            timestamp_ms,
        }
    }

    /// Returns the number of bytes in the chunk.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the chunk carries no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One assembled, application-meaningful message.
///
/// The timestamp is the arrival time of the chunk holding the frame's
/// first byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Frame payload.
    pub bytes: Vec<u8>,
    /// Arrival time of the first byte in milliseconds.
    pub timestamp_ms: u64,
}

impl Frame {
    /// Creates a frame.
    #[inline]
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>, timestamp_ms: u64) -> Self {
        Self {
            bytes: bytes.into(),
            timestamp_ms,
        }
    }

    /// Decodes the frame as UTF-8, replacing invalid sequences.
    #[inline]
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Returns the number of bytes in the frame.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the frame is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<TimedChunk> for Frame {
    fn from(chunk: TimedChunk) -> Self {
        Self {
            bytes: chunk.bytes,
            timestamp_ms: chunk.timestamp_ms,
        }
    }
}

impl From<Frame> for TimedChunk {
    fn from(frame: Frame) -> Self {
        Self {
            bytes: frame.bytes,
            timestamp_ms: frame.timestamp_ms,
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Milliseconds since the Unix epoch, used to stamp outgoing payloads.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_text_is_lossy() {
        let frame = Frame::new(vec![b'O', b'K', 0xFF], 10);
        assert_eq!(frame.text(), "OK\u{FFFD}");
    }

    #[test]
    fn test_chunk_serialization_uses_camel_case() {
        let chunk = TimedChunk::new(vec![1, 2], 42);
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["timestampMs"], 42);
        assert_eq!(json["bytes"], serde_json::json!([1, 2]));
    }
}
