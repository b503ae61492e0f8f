//! Strategy dispatch for the frame assembler.
//!
//! A [`FramingConfig`] is resolved into a [`Strategy`]: either one of the
//! built-in byte-oriented framers or a user script. Resolution never fails;
//! degenerate parameters fall back to a usable framer.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::script::{FramingScript, ScriptEngine};

use super::buffer::ChunkBuffer;
use super::config::{ByteOrder, FramingConfig, FramingStrategy};
use super::types::Frame;

// ============================================================================
// Constants
// ============================================================================

/// Largest payload a length prefix may declare before the stream is
/// considered corrupt.
pub const MAX_PREFIXED_PAYLOAD: u64 = 16 * 1024 * 1024;

// ============================================================================
// FixedFramer
// ============================================================================

/// Built-in framing algorithms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixedFramer {
    /// Every push becomes one frame.
    Passthrough,
    /// Frames end with (and include) the delimiter.
    Delimited {
        /// Delimiter bytes, never empty.
        delimiter: Vec<u8>,
    },
    /// Buffer is emitted after a quiet period with no pushes.
    Debounced {
        /// Silence required before emission.
        quiet: Duration,
    },
    /// Frames are preceded by an unsigned length header.
    LengthPrefixed {
        /// Header width in bytes (1..=8).
        width: usize,
        /// Header byte order.
        order: ByteOrder,
    },
}

/// Outcome of running a fixed framer over the buffer.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    /// Frames cut from the front of the buffer.
    pub frames: Vec<Frame>,
    /// Set when the buffer had to be discarded as a raw frame.
    pub reset: bool,
}

impl FixedFramer {
    /// Cuts every complete frame from the front of `buffer`.
    pub(crate) fn drain(&self, buffer: &mut ChunkBuffer) -> Drained {
        let mut drained = Drained::default();

        match self {
            Self::Passthrough => drained.frames.extend(buffer.take_all()),

            Self::Debounced { .. } => {}

            Self::Delimited { delimiter } => {
                while let Some(pos) = buffer.find(delimiter, 0) {
                    drained.frames.push(buffer.take_front(pos + delimiter.len()));
                }
            }

            Self::LengthPrefixed { width, order } => {
                while buffer.len() >= *width {
                    let declared = order.read_uint(&buffer.as_slice()[..*width]);

                    if declared > MAX_PREFIXED_PAYLOAD {
                        warn!(
                            declared,
                            max = MAX_PREFIXED_PAYLOAD,
                            "Length prefix out of range, flushing buffer as raw frame"
                        );
                        drained.frames.extend(buffer.take_all());
                        drained.reset = true;
                        break;
                    }

                    let total = *width + declared as usize;
                    if buffer.len() < total {
                        break;
                    }

                    let mut frame = buffer.take_front(total);
                    frame.bytes.drain(..*width);
                    drained.frames.push(frame);
                }
            }
        }

        drained
    }
}

// ============================================================================
// ScriptedFramer
// ============================================================================

/// A framing script resolved from configuration.
#[derive(Clone)]
pub struct ScriptedFramer {
    /// Script name from configuration.
    pub name: String,
    /// Resolved script, or `None` if it could not be resolved.
    pub script: Option<Arc<dyn FramingScript>>,
}

impl fmt::Debug for ScriptedFramer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedFramer")
            .field("name", &self.name)
            .field("resolved", &self.script.is_some())
            .finish()
    }
}

// ============================================================================
// Strategy
// ============================================================================

/// Resolved framing strategy.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Built-in framer.
    Fixed(FixedFramer),
    /// User script.
    Scripted(ScriptedFramer),
}

impl Strategy {
    /// Resolves a configuration into a strategy.
    pub fn resolve(config: &FramingConfig, scripts: &dyn ScriptEngine) -> Self {
        let strategy = match config.strategy {
            FramingStrategy::None => Self::Fixed(FixedFramer::Passthrough),

            FramingStrategy::Delimiter => match config.delimiter_bytes() {
                Some(delimiter) => Self::Fixed(FixedFramer::Delimited { delimiter }),
                None => {
                    debug!("Empty delimiter, using pass-through framing");
                    Self::Fixed(FixedFramer::Passthrough)
                }
            },

            FramingStrategy::Timeout => Self::Fixed(FixedFramer::Debounced {
                quiet: config.quiet_period(),
            }),

            FramingStrategy::PrefixLength => {
                if config.clamped_prefix_size() != usize::from(config.prefix_length_size) {
                    debug!(
                        requested = config.prefix_length_size,
                        "Prefix length size clamped"
                    );
                }
                Self::Fixed(FixedFramer::LengthPrefixed {
                    width: config.clamped_prefix_size(),
                    order: config.byte_order,
                })
            }

            FramingStrategy::Script => {
                let script = match scripts.framing(&config.script) {
                    Ok(script) => Some(script),
                    Err(e) => {
                        warn!(error = %e, "Framing script unavailable, buffering until flush");
                        None
                    }
                };
                Self::Scripted(ScriptedFramer {
                    name: config.script.clone(),
                    script,
                })
            }
        };

        debug!(strategy = ?strategy, "Framing strategy resolved");
        strategy
    }

    /// Returns the debounce interval for the timeout strategy.
    #[inline]
    #[must_use]
    pub fn quiet_period(&self) -> Option<Duration> {
        match self {
            Self::Fixed(FixedFramer::Debounced { quiet }) => Some(*quiet),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::script::ScriptRegistry;

    fn buffer_of(parts: &[&[u8]]) -> ChunkBuffer {
        let mut buffer = ChunkBuffer::new();
        for (i, part) in parts.iter().enumerate() {
            buffer.push(part, i as u64);
        }
        buffer
    }

    #[test]
    fn test_delimited_includes_delimiter() {
        let framer = FixedFramer::Delimited {
            delimiter: b",".to_vec(),
        };
        let mut buffer = buffer_of(&[b"A,B,C,"]);
        let drained = framer.drain(&mut buffer);

        let frames: Vec<_> = drained.frames.iter().map(|f| f.bytes.clone()).collect();
        assert_eq!(frames, vec![b"A,".to_vec(), b"B,".to_vec(), b"C,".to_vec()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_delimited_keeps_partial_tail() {
        let framer = FixedFramer::Delimited {
            delimiter: b"\r\n".to_vec(),
        };
        let mut buffer = buffer_of(&[b"OK\r", b"\nREA"]);
        let drained = framer.drain(&mut buffer);
        assert_eq!(drained.frames.len(), 1);
        assert_eq!(drained.frames[0].bytes, b"OK\r\n");
        assert_eq!(drained.frames[0].timestamp_ms, 0);
        assert_eq!(buffer.as_slice(), b"REA");
    }

    #[test]
    fn test_length_prefixed_waits_for_payload() {
        let framer = FixedFramer::LengthPrefixed {
            width: 2,
            order: ByteOrder::Big,
        };
        let mut buffer = buffer_of(&[&[0x00, 0x03, b'a']]);
        assert!(framer.drain(&mut buffer).frames.is_empty());
        assert_eq!(buffer.len(), 3);

        buffer.push(b"bc\x00\x01z", 9);
        let drained = framer.drain(&mut buffer);
        let frames: Vec<_> = drained.frames.iter().map(|f| f.bytes.clone()).collect();
        assert_eq!(frames, vec![b"abc".to_vec(), b"z".to_vec()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_length_prefixed_zero_length() {
        let framer = FixedFramer::LengthPrefixed {
            width: 1,
            order: ByteOrder::Little,
        };
        let mut buffer = buffer_of(&[&[0x00, 0x00]]);
        let drained = framer.drain(&mut buffer);
        assert_eq!(drained.frames.len(), 2);
        assert!(drained.frames.iter().all(Frame::is_empty));
    }

    #[test]
    fn test_length_prefixed_oversized_resets() {
        let framer = FixedFramer::LengthPrefixed {
            width: 8,
            order: ByteOrder::Big,
        };
        let mut buffer = buffer_of(&[&[0xFF; 10]]);
        let drained = framer.drain(&mut buffer);
        assert!(drained.reset);
        assert_eq!(drained.frames.len(), 1);
        assert_eq!(drained.frames[0].len(), 10);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_resolve_degrades_empty_delimiter() {
        let scripts = ScriptRegistry::new();
        let strategy = Strategy::resolve(&FramingConfig::delimiter(""), &scripts);
        assert!(matches!(strategy, Strategy::Fixed(FixedFramer::Passthrough)));
    }

    #[test]
    fn test_resolve_missing_script() {
        let scripts = ScriptRegistry::new();
        let strategy = Strategy::resolve(&FramingConfig::script("nope"), &scripts);
        match strategy {
            Strategy::Scripted(framer) => {
                assert_eq!(framer.name, "nope");
                assert!(framer.script.is_none());
            }
            other => panic!("unexpected strategy: {other:?}"),
        }
    }
}
