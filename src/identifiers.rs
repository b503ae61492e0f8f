//! Type-safe identifiers for sessions, expectations and commands.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Backing | Source |
//! |------|---------|--------|
//! | [`SessionId`] | non-zero `u32` | process-wide counter |
//! | [`ExpectationId`] | UUID v4 | generated per registration |
//! | [`CommandId`] | `String` | command catalog |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// SessionId
// ============================================================================

/// Counter backing [`SessionId::next`].
static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Identifier of one logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(NonZeroU32);

impl SessionId {
    /// Creates a session ID from a raw value.
    ///
    /// Returns `None` for zero.
    #[inline]
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Alias for [`SessionId::new`].
    #[inline]
    #[must_use]
    pub fn from_u32(id: u32) -> Option<Self> {
        Self::new(id)
    }

    /// Allocates the next unused session ID.
    #[must_use]
    pub fn next() -> Self {
        loop {
            let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
            if let Some(id) = NonZeroU32::new(id) {
                return Self(id);
            }
        }
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ExpectationId
// ============================================================================

/// Identifier of one registered response expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectationId(Uuid);

impl ExpectationId {
    /// Generates a fresh random ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ExpectationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CommandId
// ============================================================================

/// Identifier of a saved command in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    /// Creates a command ID.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommandId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CommandId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_rejects_zero() {
        assert!(SessionId::new(0).is_none());
        assert_eq!(SessionId::new(7).map(|id| id.as_u32()), Some(7));
    }

    #[test]
    fn test_session_id_next_is_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_expectation_id_unique() {
        assert_ne!(ExpectationId::generate(), ExpectationId::generate());
    }

    #[test]
    fn test_command_id_display() {
        let id = CommandId::from("at-ping");
        assert_eq!(id.to_string(), "at-ping");
        assert_eq!(id.as_str(), "at-ping");
    }
}
