//! Session arena and outbound hooks.
//!
//! A session is one device connection. Each open session owns a frame
//! assembler; teardown goes through [`SessionManager::close`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`SessionManagerBuilder`] |
//! | `manager` | [`SessionManager`] |
//! | `sinks` | Telemetry, log, notification and frame hooks |

// ============================================================================
// Submodules
// ============================================================================

/// Manager configuration.
pub mod builder;

/// Session lifecycle and inbound data.
pub mod manager;

/// Outbound hooks.
pub mod sinks;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionManagerBuilder;
pub use manager::SessionManager;
pub use sinks::{
    Direction, FrameObserver, FrameRecord, Level, LogSink, NoopSink, NotificationSink, Sinks,
    TelemetrySink,
};
