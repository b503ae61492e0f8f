//! Script engine backed by registered Rust closures.
//!
//! Configuration refers to scripts by name; [`ScriptRegistry`] maps those
//! names to implementations registered by the host application.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use device_link::script::ScriptRegistry;
//!
//! let scripts = ScriptRegistry::new();
//! scripts.validation_fn("ends_with_ok", |text: &str, _raw: &[u8]| {
//!     Ok(json!(text.trim_end().ends_with("OK")))
//! });
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::framing::TimedChunk;

use super::{
    FramingOutput, FramingScript, Params, PreSendScript, ScriptEngine, ScriptResult,
    TransformContext, TransformScript, ValidationScript,
};

// ============================================================================
// ScriptRegistry
// ============================================================================

/// Name-to-implementation script table.
#[derive(Default)]
pub struct ScriptRegistry {
    framing: RwLock<FxHashMap<String, Arc<dyn FramingScript>>>,
    validation: RwLock<FxHashMap<String, Arc<dyn ValidationScript>>>,
    transform: RwLock<FxHashMap<String, Arc<dyn TransformScript>>>,
    pre_send: RwLock<FxHashMap<String, Arc<dyn PreSendScript>>>,
}

// ============================================================================
// ScriptRegistry - Registration
// ============================================================================

impl ScriptRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a framing script implementation.
    pub fn insert_framing(&self, name: impl Into<String>, script: Arc<dyn FramingScript>) {
        let name = name.into();
        debug!(script = %name, "Registered framing script");
        self.framing.write().insert(name, script);
    }

    /// Registers a framing closure.
    pub fn framing_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&[TimedChunk], bool) -> ScriptResult<FramingOutput> + Send + Sync + 'static,
    {
        self.insert_framing(name, Arc::new(f));
    }

    /// Registers a validation predicate implementation.
    pub fn insert_validation(&self, name: impl Into<String>, script: Arc<dyn ValidationScript>) {
        let name = name.into();
        debug!(script = %name, "Registered validation script");
        self.validation.write().insert(name, script);
    }

    /// Registers a validation closure.
    pub fn validation_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&str, &[u8]) -> ScriptResult<Value> + Send + Sync + 'static,
    {
        self.insert_validation(name, Arc::new(f));
    }

    /// Registers a transform script implementation.
    pub fn insert_transform(&self, name: impl Into<String>, script: Arc<dyn TransformScript>) {
        let name = name.into();
        debug!(script = %name, "Registered transform script");
        self.transform.write().insert(name, script);
    }

    /// Registers a transform closure.
    pub fn transform_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut TransformContext) -> ScriptResult<Value> + Send + Sync + 'static,
    {
        self.insert_transform(name, Arc::new(f));
    }

    /// Registers a pre-send script implementation.
    pub fn insert_pre_send(&self, name: impl Into<String>, script: Arc<dyn PreSendScript>) {
        let name = name.into();
        debug!(script = %name, "Registered pre-send script");
        self.pre_send.write().insert(name, script);
    }

    /// Registers a pre-send closure.
    pub fn pre_send_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&Params, &str) -> ScriptResult<Value> + Send + Sync + 'static,
    {
        self.insert_pre_send(name, Arc::new(f));
    }
}

// ============================================================================
// ScriptRegistry - Lookup
// ============================================================================

/// Looks up a script by name.
fn lookup<S: ?Sized>(table: &RwLock<FxHashMap<String, Arc<S>>>, name: &str) -> Result<Arc<S>> {
    table
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| Error::script(name, "no script registered under this name"))
}

impl ScriptEngine for ScriptRegistry {
    fn framing(&self, name: &str) -> Result<Arc<dyn FramingScript>> {
        lookup(&self.framing, name)
    }

    fn validation(&self, name: &str) -> Result<Arc<dyn ValidationScript>> {
        lookup(&self.validation, name)
    }

    fn transform(&self, name: &str) -> Result<Arc<dyn TransformScript>> {
        lookup(&self.transform, name)
    }

    fn pre_send(&self, name: &str) -> Result<Arc<dyn PreSendScript>> {
        lookup(&self.pre_send, name)
    }
}

// ============================================================================
// Tests
// ============================================================================
