//! User script contracts.
//!
//! Framing, validation, transform and pre-send behaviour can be supplied as
//! user scripts. This crate does not implement a scripting language; it
//! defines the contract each script satisfies and resolves script names
//! through a pluggable [`ScriptEngine`].
//!
//! | Contract | Signature |
//! |----------|-----------|
//! | [`FramingScript`] | `(chunks, force_flush) -> { frames, remaining }` |
//! | [`ValidationScript`] | `(text, raw) -> bool` |
//! | [`TransformScript`] | `(text, raw, setVariable, log, params) -> any` |
//! | [`PreSendScript`] | `(params, payload) -> string \| number[]` |
//!
//! Every invocation goes through [`ScriptSandbox`], which runs it off the
//! caller's thread under a hard time limit.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `context` | Transform script context (`setVariable`, `log`) |
//! | `registry` | Name-to-closure [`ScriptEngine`] |
//! | `sandbox` | Time-bounded execution |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::framing::TimedChunk;

// ============================================================================
// Submodules
// ============================================================================

/// Transform script context.
pub mod context;

/// Name-to-closure script engine.
pub mod registry;

/// Time-bounded script execution.
pub mod sandbox;

// ============================================================================
// Re-exports
// ============================================================================

pub use context::{ScriptLog, TransformContext, Variable};
pub use registry::ScriptRegistry;
pub use sandbox::{DEFAULT_SCRIPT_TIME_LIMIT, ScriptSandbox};

// ============================================================================
// Types
// ============================================================================

/// Named parameter values handed to scripts and payload templates.
pub type Params = serde_json::Map<String, Value>;

/// Result of a user script. The error is the script's own message.
pub type ScriptResult<T> = std::result::Result<T, String>;

/// Output of a framing script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramingOutput {
    /// Completed frames, in order.
    pub frames: Vec<TimedChunk>,
    /// Chunks to keep buffered.
    pub remaining: Vec<TimedChunk>,
}

// ============================================================================
// Script Contracts
// ============================================================================

/// Cuts buffered chunks into frames.
pub trait FramingScript: Send + Sync {
    /// Splits `chunks` into frames and a remainder.
    ///
    /// `force_flush` is `true` only when the assembler is flushed.
    fn frame(&self, chunks: &[TimedChunk], force_flush: bool) -> ScriptResult<FramingOutput>;
}

/// Decides whether a frame is the expected reply.
///
/// Only a literal `Value::Bool(true)` counts as a match.
pub trait ValidationScript: Send + Sync {
    /// Tests one frame.
    fn check(&self, text: &str, raw: &[u8]) -> ScriptResult<Value>;
}

/// Extracts named values from a matched frame.
pub trait TransformScript: Send + Sync {
    /// Runs the transform. Values stored with
    /// [`TransformContext::set_variable`] are published as telemetry.
    fn transform(&self, ctx: &mut TransformContext) -> ScriptResult<Value>;
}

/// Rewrites an outgoing payload.
///
/// Returns a string, or an array of numbers in `0..=255` for raw bytes.
pub trait PreSendScript: Send + Sync {
    /// Produces the bytes to write.
    fn transform(&self, params: &Params, payload: &str) -> ScriptResult<Value>;
}

impl<F> FramingScript for F
where
    F: Fn(&[TimedChunk], bool) -> ScriptResult<FramingOutput> + Send + Sync,
{
    fn frame(&self, chunks: &[TimedChunk], force_flush: bool) -> ScriptResult<FramingOutput> {
        self(chunks, force_flush)
    }
}

impl<F> ValidationScript for F
where
    F: Fn(&str, &[u8]) -> ScriptResult<Value> + Send + Sync,
{
    fn check(&self, text: &str, raw: &[u8]) -> ScriptResult<Value> {
        self(text, raw)
    }
}

impl<F> TransformScript for F
where
    F: Fn(&mut TransformContext) -> ScriptResult<Value> + Send + Sync,
{
    fn transform(&self, ctx: &mut TransformContext) -> ScriptResult<Value> {
        self(ctx)
    }
}

impl<F> PreSendScript for F
where
    F: Fn(&Params, &str) -> ScriptResult<Value> + Send + Sync,
{
    fn transform(&self, params: &Params, payload: &str) -> ScriptResult<Value> {
        self(params, payload)
    }
}

// ============================================================================
// ScriptEngine
// ============================================================================

/// Resolves script names from configuration into callable scripts.
///
/// Returns [`crate::Error::Script`] when a name cannot be resolved.
pub trait ScriptEngine: Send + Sync {
    /// Resolves a framing script.
    fn framing(&self, name: &str) -> Result<Arc<dyn FramingScript>>;

    /// Resolves a validation predicate.
    fn validation(&self, name: &str) -> Result<Arc<dyn ValidationScript>>;

    /// Resolves a transform script.
    fn transform(&self, name: &str) -> Result<Arc<dyn TransformScript>>;

    /// Resolves a pre-send script.
    fn pre_send(&self, name: &str) -> Result<Arc<dyn PreSendScript>>;
}
