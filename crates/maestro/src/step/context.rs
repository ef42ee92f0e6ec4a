//! Shared context mapping handed to every step of a run

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

/// String-keyed value bag shared by all steps of one run
///
/// Cloning the context is cheap and yields a handle to the same map, so a
/// value inserted by one step is visible to every step after it. Step
/// outputs are not chained into the next step's input; data flows between
/// steps only through this context.
///
/// # Example
///
/// ```
/// use maestro::WorkflowContext;
/// use serde_json::json;
///
/// let ctx = WorkflowContext::new();
/// let handle = ctx.clone();
/// handle.insert("order_id", json!("A-17"));
///
/// assert_eq!(ctx.get("order_id"), Some(json!("A-17")));
/// ```
#[derive(Clone, Default)]
pub struct WorkflowContext {
    values: Arc<RwLock<Map<String, Value>>>,
}

impl WorkflowContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with the given values
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }

    /// Get a copy of the value stored under `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Check if a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Insert a value, returning the previous one
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.write().insert(key.into(), value)
    }

    /// Remove a value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    /// Mutate the map in place under a single write lock
    pub fn update<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        f(&mut self.values.write())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Check if the context is empty
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Map<String, Value> {
        self.values.read().clone()
    }

    /// Copy of the current contents as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.snapshot())
    }
}

impl fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("values", &*self.values.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_values() {
        let ctx = WorkflowContext::new();
        let other = ctx.clone();

        other.insert("count", json!(1));

        assert_eq!(ctx.get("count"), Some(json!(1)));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let ctx = WorkflowContext::new();
        ctx.insert("a", json!("x"));

        let snapshot = ctx.snapshot();
        ctx.insert("a", json!("y"));

        assert_eq!(snapshot.get("a"), Some(&json!("x")));
        assert_eq!(ctx.get("a"), Some(json!("y")));
    }

    #[test]
    fn test_update_in_place() {
        let ctx = WorkflowContext::new();
        ctx.insert("n", json!(1));

        let previous = ctx.update(|values| {
            let n = values.get("n").and_then(Value::as_i64).unwrap_or(0);
            values.insert("n".to_string(), json!(n + 1));
            n
        });

        assert_eq!(previous, 1);
        assert_eq!(ctx.get("n"), Some(json!(2)));
    }

    #[test]
    fn test_to_value_and_remove() {
        let ctx = WorkflowContext::from_map(Map::new());
        assert!(ctx.is_empty());
        assert_eq!(ctx.to_value(), json!({}));

        ctx.insert("k", json!(true));
        assert!(ctx.contains_key("k"));
        assert_eq!(ctx.remove("k"), Some(json!(true)));
        assert!(!ctx.contains_key("k"));
    }
}
