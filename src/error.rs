//! Error types for device-link.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use device_link::{Error, Result};
//!
//! async fn example(manager: &SessionManager, session_id: SessionId) -> Result<()> {
//!     manager.ingest(session_id, b"OK\r\n", 0)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Scripts | [`Error::Script`] |
//! | Validation | [`Error::ValidationTimeout`], [`Error::ValidationCancelled`], [`Error::TooManyPending`] |
//! | Transport | [`Error::Transport`], [`Error::ChannelClosed`] |
//! | Lookup | [`Error::SessionNotFound`], [`Error::CommandNotFound`] |
//! | Sequencing | [`Error::Cancelled`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::identifiers::{CommandId, ExpectationId, SessionId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Every error is scoped to one session; none of them poison another
/// session's assembler or pending expectations.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when options or framing parameters are invalid and cannot
    /// be degraded to a usable value.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Script Errors
    // ========================================================================
    /// User script failed.
    ///
    /// Covers returned errors, panics, time-limit overruns and
    /// unresolvable script names.
    #[error("Script error in {script}: {message}")]
    Script {
        /// Name of the script that failed.
        script: String,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Expected response did not arrive in time.
    #[error("Validation for '{command}' timed out after {timeout_ms}ms")]
    ValidationTimeout {
        /// Name of the command whose reply was expected.
        command: String,
        /// Expectation that timed out.
        expectation_id: ExpectationId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Expectation was removed before it settled (session cleared).
    #[error("Validation for '{command}' cancelled")]
    ValidationCancelled {
        /// Name of the command whose reply was expected.
        command: String,
    },

    /// Too many pending expectations on one session.
    #[error("Too many pending expectations on session {session_id}: {limit}")]
    TooManyPending {
        /// Session that hit the limit.
        session_id: SessionId,
        /// Configured limit.
        limit: usize,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Transport write or read failed.
    #[error("Transport error on session {session_id}: {message}")]
    Transport {
        /// Session whose transport failed.
        session_id: SessionId,
        /// Description of the failure.
        message: String,
    },

    /// Internal channel closed before a result was delivered.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),

    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// Session is not open.
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// The missing session.
        session_id: SessionId,
    },

    /// Command is not in the catalog.
    #[error("Command not found: {command_id}")]
    CommandNotFound {
        /// The missing command.
        command_id: CommandId,
    },

    // ========================================================================
    // Sequencing Errors
    // ========================================================================
    /// Operation cancelled by the caller.
    #[error("Cancelled: {operation}")]
    Cancelled {
        /// Description of the cancelled operation.
        operation: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a script error.
    #[inline]
    pub fn script(script: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Script {
            script: script.into(),
            message: message.into(),
        }
    }

    /// Creates a validation timeout error.
    #[inline]
    pub fn validation_timeout(
        command: impl Into<String>,
        expectation_id: ExpectationId,
        timeout_ms: u64,
    ) -> Self {
        Self::ValidationTimeout {
            command: command.into(),
            expectation_id,
            timeout_ms,
        }
    }

    /// Creates a validation cancelled error.
    #[inline]
    pub fn validation_cancelled(command: impl Into<String>) -> Self {
        Self::ValidationCancelled {
            command: command.into(),
        }
    }

    /// Creates a too many pending error.
    #[inline]
    pub fn too_many_pending(session_id: SessionId, limit: usize) -> Self {
        Self::TooManyPending { session_id, limit }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(session_id: SessionId, message: impl Into<String>) -> Self {
        Self::Transport {
            session_id,
            message: message.into(),
        }
    }

    /// Creates a session not found error.
    #[inline]
    pub fn session_not_found(session_id: SessionId) -> Self {
        Self::SessionNotFound { session_id }
    }

    /// Creates a command not found error.
    #[inline]
    pub fn command_not_found(command_id: CommandId) -> Self {
        Self::CommandNotFound { command_id }
    }

    /// Creates a cancelled error.
    #[inline]
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ValidationTimeout { .. })
    }

    /// Returns `true` if a user script caused this error.
    #[inline]
    #[must_use]
    pub fn is_script_error(&self) -> bool {
        matches!(self, Self::Script { .. })
    }

    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::ChannelClosed(_))
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry without reconnecting.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ValidationTimeout { .. } | Self::Script { .. } | Self::TooManyPending { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
