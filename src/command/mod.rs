//! Saved commands and their execution.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `executor` | [`CommandExecutor`] and [`SendReceipt`] |
//! | `payload` | Placeholder substitution and encoding |
//! | `types` | [`Command`] definition |

// ============================================================================
// Submodules
// ============================================================================

/// Command execution.
pub mod executor;

/// Payload templating and encoding.
pub mod payload;

/// Saved command definitions.
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use executor::{CommandExecutor, SendReceipt};
pub use types::{Command, CommandParameter, LineEnding, PayloadFormat};
