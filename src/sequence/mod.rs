//! Ordered command sequences.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `cancel` | [`CancelToken`] |
//! | `catalog` | [`CommandStore`] seam and in-memory [`CommandCatalog`] |
//! | `runner` | [`SequenceRunner`] and outcomes |
//! | `types` | [`Sequence`] and [`SequenceStep`] |

// ============================================================================
// Submodules
// ============================================================================

/// Cooperative cancellation.
pub mod cancel;

/// Command lookup.
pub mod catalog;

/// Sequence execution.
pub mod runner;

/// Sequence definitions.
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use cancel::CancelToken;
pub use catalog::{CommandCatalog, CommandStore};
pub use runner::{SequenceOutcome, SequenceRunner, StepOutcome};
pub use types::{Sequence, SequenceStep};
