//! Frame assembly.
//!
//! Turns a live, arbitrarily chunked byte stream into discrete frames.
//!
//! # Strategies
//!
//! | Strategy | Frame boundary |
//! |----------|----------------|
//! | `NONE` | every push |
//! | `DELIMITER` | after each delimiter (delimiter included in the frame) |
//! | `TIMEOUT` | after `timeout` ms without a push |
//! | `PREFIX_LENGTH` | `prefixLengthSize`-byte length header, header consumed |
//! | `SCRIPT` | decided by a [`FramingScript`](crate::script::FramingScript) |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `assembler` | Per-session [`FrameAssembler`] |
//! | `buffer` | Timestamped accumulation buffer |
//! | `config` | Persisted [`FramingConfig`] and delimiter parsing |
//! | `strategy` | Fixed and scripted framers |
//! | `types` | [`TimedChunk`] and [`Frame`] |

// ============================================================================
// Submodules
// ============================================================================

/// Per-session frame assembler.
pub mod assembler;

/// Timestamped accumulation buffer.
mod buffer;

/// Framing configuration.
pub mod config;

/// Fixed and scripted framers.
pub mod strategy;

/// Chunk and frame types.
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use assembler::{FrameAssembler, FrameSink, OverrideToken};
pub use config::{ByteOrder, FramingConfig, FramingStrategy, parse_delimiter};
pub use strategy::{FixedFramer, ScriptedFramer, Strategy};
pub use types::{Frame, TimedChunk, unix_millis};
