//! Step registry
//!
//! Maps step identifiers to type-erased step procedures. Lookups take a
//! shared read lock; registrations take the write lock.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use crate::step::StepFn;

/// Registry of step procedures
///
/// # Example
///
/// ```
/// use maestro::engine::StepRegistry;
/// use maestro::step_fn;
/// use serde_json::json;
///
/// let registry = StepRegistry::new();
/// registry.register("ping", step_fn(|_scope, _ctx| async { Ok(json!("pong")) }));
///
/// assert!(registry.lookup("ping").is_some());
/// assert!(registry.lookup("unknown").is_none());
/// ```
#[derive(Default)]
pub struct StepRegistry {
    steps: RwLock<HashMap<String, StepFn>>,
}

impl StepRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step procedure, replacing any previous one under `id`
    ///
    /// Returns `true` if an existing registration was replaced.
    pub fn register(&self, id: impl Into<String>, step: StepFn) -> bool {
        self.steps.write().insert(id.into(), step).is_some()
    }

    /// Look up a step procedure
    pub fn lookup(&self, id: &str) -> Option<StepFn> {
        self.steps.read().get(id).cloned()
    }

    /// Check if a step is registered
    pub fn contains(&self, id: &str) -> bool {
        self.steps.read().contains_key(id)
    }

    /// Get the number of registered steps
    pub fn len(&self) -> usize {
        self.steps.read().len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.steps.read().is_empty()
    }

    /// Get all registered step identifiers
    pub fn step_ids(&self) -> Vec<String> {
        self.steps.read().keys().cloned().collect()
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("step_ids", &self.step_ids())
            .finish()
    }
}
