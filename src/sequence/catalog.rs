//! Command lookup for sequences.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::command::Command;
use crate::identifiers::CommandId;

// ============================================================================
// CommandStore
// ============================================================================

/// Source of saved commands, keyed by ID.
pub trait CommandStore: Send + Sync {
    /// Looks up a command.
    fn command(&self, id: &CommandId) -> Option<Command>;
}

// ============================================================================
// CommandCatalog
// ============================================================================

/// In-memory command store.
#[derive(Debug, Default)]
pub struct CommandCatalog {
    commands: RwLock<FxHashMap<CommandId, Command>>,
}

impl CommandCatalog {
    /// Creates an empty catalog.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a command. Returns the previous one.
    pub fn insert(&self, command: Command) -> Option<Command> {
        debug!(command_id = %command.id, "Command stored");
        self.commands.write().insert(command.id.clone(), command)
    }

    /// Removes a command.
    pub fn remove(&self, id: &CommandId) -> Option<Command> {
        self.commands.write().remove(id)
    }

    /// Returns the number of stored commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    /// Returns `true` if no commands are stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }
}

impl FromIterator<Command> for CommandCatalog {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        let catalog = Self::new();
        for command in iter {
            catalog.insert(command);
        }
        catalog
    }
}

impl CommandStore for CommandCatalog {
    fn command(&self, id: &CommandId) -> Option<Command> {
        self.commands.read().get(id).cloned()
    }
}

// ============================================================================
// Tests
// ============================================================================
