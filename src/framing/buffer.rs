//! Accumulation buffer for not-yet-framed bytes.
//!
//! Bytes are stored contiguously so byte-oriented strategies can scan them
//! directly, while chunk boundaries and arrival timestamps are kept as
//! marks so the scripted strategy still sees the original chunks.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use super::types::{Frame, TimedChunk};

// ============================================================================
// ChunkBuffer
// ============================================================================

/// Contiguous byte buffer that remembers chunk boundaries.
#[derive(Debug, Default, Clone)]
pub(crate) struct ChunkBuffer {
    /// Buffered bytes, oldest first.
    bytes: Vec<u8>,
    /// `(start offset, timestamp)` of every chunk still (partly) buffered.
    marks: VecDeque<(usize, u64)>,
}

impl ChunkBuffer {
    /// Creates an empty buffer.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk. Empty chunks are ignored.
    pub fn push(&mut self, bytes: &[u8], timestamp_ms: u64) {
        if bytes.is_empty() {
            return;
        }
        self.marks.push_back((self.bytes.len(), timestamp_ms));
        self.bytes.extend_from_slice(bytes);
    }

    /// Returns the buffered bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if nothing is buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Finds the first occurrence of `needle` at or after `from`.
    pub fn find(&self, needle: &[u8], from: usize) -> Option<usize> {
        if needle.is_empty() || from >= self.bytes.len() {
            return None;
        }
        self.bytes[from..]
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|pos| pos + from)
    }

    /// Removes the first `n` bytes and returns them as a frame.
    ///
    /// The frame carries the timestamp of the chunk its first byte came from.
    pub fn take_front(&mut self, n: usize) -> Frame {
        let n = n.min(self.bytes.len());
        let timestamp_ms = self.front_timestamp();
        let remainder = self.bytes.split_off(n);
        let taken = std::mem::replace(&mut self.bytes, remainder);

        if self.bytes.is_empty() {
            self.marks.clear();
        } else {
            // Keep the chunk that now holds byte 0 plus everything after it.
            while self.marks.len() > 1 && self.marks[1].0 <= n {
                self.marks.pop_front();
            }
            for mark in &mut self.marks {
                mark.0 = mark.0.saturating_sub(n);
            }
        }

        Frame::new(taken, timestamp_ms)
    }

    /// Removes everything and returns it as one frame, if non-empty.
    pub fn take_all(&mut self) -> Option<Frame> {
        if self.bytes.is_empty() {
            return None;
        }
        let len = self.bytes.len();
        Some(self.take_front(len))
    }

    /// Reconstructs the buffered chunks in arrival order.
    pub fn chunks(&self) -> Vec<TimedChunk> {
        let mut chunks = Vec::with_capacity(self.marks.len());
        for (i, &(start, timestamp_ms)) in self.marks.iter().enumerate() {
            let end = self
                .marks
                .get(i + 1)
                .map_or(self.bytes.len(), |&(next, _)| next);
            chunks.push(TimedChunk::new(&self.bytes[start..end], timestamp_ms));
        }
        chunks
    }

    /// Replaces the buffer with the given chunks.
    pub fn replace(&mut self, chunks: Vec<TimedChunk>) {
        self.bytes.clear();
        self.marks.clear();
        for chunk in chunks {
            self.push(&chunk.bytes, chunk.timestamp_ms);
        }
    }

    /// Timestamp of the oldest buffered byte.
    fn front_timestamp(&self) -> u64 {
        self.marks.front().map_or(0, |&(_, ts)| ts)
    }
}

// ============================================================================
// Tests
// ============================================================================
