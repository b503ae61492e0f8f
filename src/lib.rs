//! Device Link - Frame assembly, response validation and command sequencing
//! for byte-oriented devices.
//!
//! This library is the core of a serial/TCP/BLE terminal: it turns raw
//! inbound byte chunks into frames, matches frames against expected
//! replies, and sends commands and multi-step sequences.
//!
//! # Architecture
//!
//! The host application owns the physical link:
//!
//! - **Inbound**: bytes read from the device are fed to
//!   [`SessionManager::ingest`]
//! - **Outbound**: commands are written through a [`Transport`] the host
//!   implements
//!
//! Key design principles:
//!
//! - Each session owns one [`FrameAssembler`] in an explicit arena
//! - A reply expectation is registered before its command is written
//! - Every expectation settles exactly once: match, timeout or cancel
//! - Checks for one session run in frame order
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use device_link::{
//!     Command, FramingConfig, Params, Result, SessionManager, ValidationConfig,
//!     transport::RecordingTransport,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = SessionManager::builder()
//!         .transport(Arc::new(RecordingTransport::new()))
//!         .build()?;
//!
//!     // One session, newline framing
//!     let session = manager.open_new(FramingConfig::delimiter("\\n"))?;
//!
//!     // Send a command and wait for a line containing "OK"
//!     let command = Command::text("at", "Attention", "AT")
//!         .with_validation(ValidationConfig::contains("OK"));
//!     let receipt = manager
//!         .executor()
//!         .send_command(session, &command, &Params::new())
//!         .await?;
//!
//!     // Bytes arrive from the device
//!     manager.ingest(session, b"OK\n", device_link::unix_millis())?;
//!
//!     let outcome = receipt.wait().await?;
//!     println!("Matched: {:?}", outcome);
//!
//!     manager.close(session)?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`command`] | Commands, payload encoding and the [`CommandExecutor`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`framing`] | Framing strategies and the [`FrameAssembler`] |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`options`] | Timeouts and limits |
//! | [`script`] | User script contracts and sandbox |
//! | [`sequence`] | Multi-step command sequences |
//! | [`session`] | Session arena and outbound hooks |
//! | [`transport`] | Outbound byte transport seam |
//! | [`validation`] | Reply expectations and matching |

// ============================================================================
// Modules
// ============================================================================

/// Commands and sending.
///
/// Use [`CommandExecutor::send_command`] to write a command and optionally
/// await its reply.
pub mod command;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Frame assembly.
///
/// Inbound chunks are cut into frames by one of five strategies.
pub mod framing;

/// Type-safe identifiers for sessions, expectations and commands.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Timeouts and limits.
pub mod options;

/// User script contracts.
pub mod script;

/// Command sequences.
pub mod sequence;

/// Session arena.
///
/// Use [`SessionManager::builder()`] to create a configured manager.
pub mod session;

/// Outbound byte transport.
pub mod transport;

/// Reply validation.
pub mod validation;

// ============================================================================
// Re-exports
// ============================================================================

// Command types
pub use command::{
    Command, CommandExecutor, CommandParameter, LineEnding, PayloadFormat, SendReceipt,
};

// Error types
pub use error::{Error, Result};

// Framing types
pub use framing::{
    ByteOrder, Frame, FrameAssembler, FramingConfig, FramingStrategy, TimedChunk, unix_millis,
};

// Identifier types
pub use identifiers::{CommandId, ExpectationId, SessionId};

// Options
pub use options::CoreOptions;

// Script types
pub use script::{Params, ScriptEngine, ScriptRegistry, ScriptSandbox};

// Sequence types
pub use sequence::{
    CancelToken, CommandCatalog, CommandStore, Sequence, SequenceOutcome, SequenceRunner,
    SequenceStep, StepOutcome,
};

// Session types
pub use session::{SessionManager, SessionManagerBuilder, Sinks};

// Transport types
pub use transport::Transport;

// Validation types
pub use validation::{
    MatchType, PendingValidation, ValidationConfig, ValidationMode, ValidationOutcome,
    ValidationRegistry,
};
