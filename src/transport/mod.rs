//! Device transport seam.
//!
//! The core never opens ports or sockets itself. The host application
//! implements [`Transport`] over its serial, TCP or BLE link and feeds
//! inbound bytes to [`SessionManager::ingest`](crate::SessionManager::ingest).
//!
//! ```text
//! ┌──────────────┐  write(bytes)   ┌──────────────┐
//! │ CommandExec  │───────────────►│  Transport   │──► device
//! └──────────────┘                 └──────────────┘
//!        ▲                                │
//!        │ validation       ingest(bytes, timestamp)
//! ┌──────────────┐                        │
//! │  Validation  │◄── frames ── Assembler ◄┘
//! └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `recording` | In-memory [`RecordingTransport`] |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::identifiers::SessionId;

// ============================================================================
// Submodules
// ============================================================================

/// In-memory transport.
pub mod recording;

// ============================================================================
// Re-exports
// ============================================================================

pub use recording::{RecordingTransport, WriteHook};

// ============================================================================
// Transport
// ============================================================================

/// Outbound byte link to a device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Writes bytes to the session's device.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Transport`] if the write fails.
    async fn write(&self, session_id: SessionId, bytes: &[u8]) -> Result<()>;
}
