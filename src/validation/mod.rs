//! Reply validation.
//!
//! A command that expects a reply registers an expectation before it is
//! written. Every frame emitted by the session's assembler is then checked
//! against the session's pending expectations until one matches or the
//! deadline passes.
//!
//! | Mode | Match |
//! |------|-------|
//! | `ALWAYS_PASS` | any frame |
//! | `PATTERN` + `CONTAINS` | substring of the decoded text |
//! | `PATTERN` + `REGEX` | regex on the decoded text |
//! | `SCRIPT` | predicate script returns literal `true` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `expectation` | [`ValidationConfig`] and [`ValidationOutcome`] |
//! | `matcher` | Compiled frame tests |
//! | `registry` | Per-session [`ValidationRegistry`] |

// ============================================================================
// Submodules
// ============================================================================

/// Expectation configuration and outcomes.
pub mod expectation;

/// Compiled frame tests.
mod matcher;

/// Per-session expectation registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use expectation::{MatchType, ValidationConfig, ValidationMode, ValidationOutcome};
pub use registry::{PendingValidation, ValidationRegistry};
