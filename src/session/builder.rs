//! Builder pattern for session manager configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use device_link::{SessionManager, transport::RecordingTransport};
//!
//! # fn example() -> device_link::Result<()> {
//! let manager = SessionManager::builder()
//!     .transport(Arc::new(RecordingTransport::new()))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::options::CoreOptions;
use crate::script::{ScriptEngine, ScriptRegistry};
use crate::sequence::{CommandCatalog, CommandStore};
use crate::transport::Transport;

use super::manager::SessionManager;
use super::sinks::Sinks;

// ============================================================================
// SessionManagerBuilder
// ============================================================================

/// Builder for a [`SessionManager`].
///
/// Use [`SessionManager::builder()`] to create one.
#[derive(Default)]
pub struct SessionManagerBuilder {
    options: CoreOptions,
    transport: Option<Arc<dyn Transport>>,
    scripts: Option<Arc<dyn ScriptEngine>>,
    sinks: Sinks,
    commands: Option<Arc<dyn CommandStore>>,
}

impl fmt::Debug for SessionManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManagerBuilder")
            .field("options", &self.options)
            .field("transport", &self.transport.is_some())
            .field("scripts", &self.scripts.is_some())
            .field("commands", &self.commands.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionManagerBuilder Implementation
// ============================================================================

impl SessionManagerBuilder {
    /// Creates a builder with default options and no transport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets timeouts and limits.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: CoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the outbound byte transport. Required.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the script engine. Defaults to an empty [`ScriptRegistry`].
    #[inline]
    #[must_use]
    pub fn scripts(mut self, scripts: Arc<dyn ScriptEngine>) -> Self {
        self.scripts = Some(scripts);
        self
    }

    /// Sets the outbound hooks. Defaults to discarding everything.
    #[inline]
    #[must_use]
    pub fn sinks(mut self, sinks: Sinks) -> Self {
        self.sinks = sinks;
        self
    }

    /// Sets the command store used by sequences. Defaults to an empty
    /// [`CommandCatalog`].
    #[inline]
    #[must_use]
    pub fn commands(mut self, commands: Arc<dyn CommandStore>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Builds the manager.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no transport was set
    /// - [`Error::Config`] if the options are invalid
    pub fn build(self) -> Result<SessionManager> {
        self.options.validate().map_err(Error::config)?;

        let transport = self.transport.ok_or_else(|| {
            Error::config(
                "Transport is required. Use .transport() to set it.\n\
                 Example: SessionManager::builder().transport(Arc::new(RecordingTransport::new()))",
            )
        })?;

        let scripts = self
            .scripts
            .unwrap_or_else(|| Arc::new(ScriptRegistry::new()));
        let commands = self
            .commands
            .unwrap_or_else(|| Arc::new(CommandCatalog::new()));

        Ok(SessionManager::new(
            self.options,
            transport,
            scripts,
            self.sinks,
            commands,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
