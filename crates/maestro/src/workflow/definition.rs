//! Workflow definition and builder

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::StepDefinition;

/// Errors from building or validating a definition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    /// A step with this identifier already exists
    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    /// A step names a successor that is not in the definition
    #[error("step {step_id} references unknown successor {successor}")]
    UnknownSuccessor { step_id: String, successor: String },

    /// Following first successors from the first step revisits a step
    #[error("successor chain revisits step {0}")]
    Cycle(String),
}

/// An ordered collection of step descriptors plus identity metadata
///
/// The runtime starts at the first step and follows each step's first
/// successor until it reaches a step without one.
///
/// # Example
///
/// ```
/// use maestro::{StepDefinition, StepKind, WorkflowDefinition};
///
/// let mut definition = WorkflowDefinition::new("order-flow", "Orders", "Process new orders");
/// definition
///     .add_step(StepDefinition::new("validate", "Validate", StepKind::Task).with_next_steps(["ship"]))
///     .unwrap();
/// definition
///     .add_step(StepDefinition::new("ship", "Ship", StepKind::Task))
///     .unwrap();
///
/// assert_eq!(definition.first_step().map(|s| s.id.as_str()), Some("validate"));
/// assert_eq!(definition.version(), 3);
/// ```
///
/// Fields are read through accessors so every change goes through a method
/// that bumps `version` and `updated_at`:
///
/// ```compile_fail
/// use maestro::WorkflowDefinition;
///
/// let mut definition = WorkflowDefinition::new("wf", "Workflow", "");
/// definition.metadata.insert("owner".into(), "ops".into());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "DefinitionRecord")]
pub struct WorkflowDefinition {
    id: String,
    name: String,
    description: String,
    version: u32,
    steps: Vec<StepDefinition>,
    metadata: Map<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Wire shape of a definition, checked before it becomes a [`WorkflowDefinition`]
#[derive(Deserialize)]
struct DefinitionRecord {
    id: String,
    name: String,
    description: String,
    version: u32,
    steps: Vec<StepDefinition>,
    #[serde(default)]
    metadata: Map<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DefinitionRecord> for WorkflowDefinition {
    type Error = DefinitionError;

    fn try_from(record: DefinitionRecord) -> Result<Self, Self::Error> {
        let mut definition = Self {
            id: record.id,
            name: record.name,
            description: record.description,
            version: record.version,
            steps: Vec::with_capacity(record.steps.len()),
            metadata: record.metadata,
            created_at: record.created_at,
            updated_at: record.updated_at,
        };
        for step in record.steps {
            definition.insert_step(step)?;
        }
        Ok(definition)
    }
}

impl WorkflowDefinition {
    /// Create an empty definition at version 1
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            version: 1,
            steps: vec![],
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Start a fluent builder
    pub fn builder(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> WorkflowDefinitionBuilder {
        WorkflowDefinitionBuilder {
            definition: Self::new(id, name, description),
            steps: vec![],
            auto_link: false,
        }
    }

    /// Append a step descriptor
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::DuplicateStep`] if the identifier is taken;
    /// the definition is left unchanged.
    pub fn add_step(&mut self, step: StepDefinition) -> Result<(), DefinitionError> {
        self.insert_step(step)?;
        self.touch();
        Ok(())
    }

    /// Set a metadata value
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
        self.touch();
    }

    /// Definition identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Starts at 1 and is incremented on every mutation
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Free-form metadata
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the definition was last mutated
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Ordered step descriptors
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Look up a step descriptor by identifier
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The step a run starts with
    pub fn first_step(&self) -> Option<&StepDefinition> {
        self.steps.first()
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the definition has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check successor references and the chain walked from the first step
    ///
    /// The runtime does not call this; a definition with a cycle runs until
    /// cancelled or until the runtime's transition limit trips.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        for step in &self.steps {
            for successor in &step.next_steps {
                if self.step(successor).is_none() {
                    return Err(DefinitionError::UnknownSuccessor {
                        step_id: step.id.clone(),
                        successor: successor.clone(),
                    });
                }
            }
        }

        let mut visited = HashSet::new();
        let mut current = self.first_step();
        while let Some(step) = current {
            if !visited.insert(step.id.as_str()) {
                return Err(DefinitionError::Cycle(step.id.clone()));
            }
            current = step.next_step().and_then(|next| self.step(next));
        }

        Ok(())
    }

    fn insert_step(&mut self, step: StepDefinition) -> Result<(), DefinitionError> {
        if self.step(&step.id).is_some() {
            return Err(DefinitionError::DuplicateStep(step.id));
        }
        self.steps.push(step);
        Ok(())
    }

    // updated_at must strictly advance even when the clock has not moved
    fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
        self.version += 1;
    }
}

/// Fluent builder for [`WorkflowDefinition`]
///
/// # Example
///
/// ```
/// use maestro::{StepDefinition, StepKind, WorkflowDefinition};
///
/// let definition = WorkflowDefinition::builder("file-sharing", "File sharing", "")
///     .step(StepDefinition::new("fetch-files", "Fetch files", StepKind::Task))
///     .step(StepDefinition::new("fetch-users", "Fetch users", StepKind::Task))
///     .step(StepDefinition::new("notify", "Notify", StepKind::Task))
///     .auto_link()
///     .build()
///     .unwrap();
///
/// assert_eq!(definition.step("fetch-files").unwrap().next_step(), Some("fetch-users"));
/// assert!(definition.step("notify").unwrap().is_terminal());
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowDefinitionBuilder {
    definition: WorkflowDefinition,
    steps: Vec<StepDefinition>,
    auto_link: bool,
}

impl WorkflowDefinitionBuilder {
    /// Append a step
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Set a metadata value
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.definition.metadata.insert(key.into(), value);
        self
    }

    /// Link each step without declared successors to the step added after it
    pub fn auto_link(mut self) -> Self {
        self.auto_link = true;
        self
    }

    /// Build the definition
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::DuplicateStep`] if two steps share an id.
    pub fn build(self) -> Result<WorkflowDefinition, DefinitionError> {
        let Self {
            mut definition,
            mut steps,
            auto_link,
        } = self;

        if auto_link {
            let ids: Vec<String> = steps.iter().map(|s| s.id.clone()).collect();
            for (step, next) in steps.iter_mut().zip(ids.into_iter().skip(1)) {
                if step.next_steps.is_empty() {
                    step.next_steps.push(next);
                }
            }
        }

        for step in steps {
            definition.insert_step(step)?;
        }
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepKind;
    use serde_json::json;

    fn task(id: &str) -> StepDefinition {
        StepDefinition::new(id, id.to_uppercase(), StepKind::Task)
    }

    #[test]
    fn test_new_definition() {
        let definition = WorkflowDefinition::new("wf", "Workflow", "Test workflow");

        assert_eq!(definition.version(), 1);
        assert!(definition.is_empty());
        assert!(definition.first_step().is_none());
        assert_eq!(definition.created_at(), definition.updated_at());
    }

    #[test]
    fn test_add_step_preserves_order() {
        let mut definition = WorkflowDefinition::new("wf", "Workflow", "");
        definition.add_step(task("b")).unwrap();
        definition.add_step(task("a")).unwrap();

        let ids: Vec<_> = definition.steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(definition.first_step().unwrap().id, "b");
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let mut definition = WorkflowDefinition::new("wf", "Workflow", "");
        definition.add_step(task("a")).unwrap();
        let version = definition.version();

        let result = definition.add_step(task("a"));

        assert_eq!(result, Err(DefinitionError::DuplicateStep("a".to_string())));
        assert_eq!(definition.len(), 1);
        assert_eq!(definition.version(), version);
    }

    #[test]
    fn test_mutations_advance_updated_at_and_version() {
        let mut definition = WorkflowDefinition::new("wf", "Workflow", "");
        let mut last = definition.updated_at();

        for i in 0..5 {
            definition.add_step(task(&format!("s{i}"))).unwrap();
            assert!(definition.updated_at() > last);
            last = definition.updated_at();
        }

        definition.set_metadata("owner", json!("ops"));
        assert!(definition.updated_at() > last);
        assert_eq!(definition.version(), 7);
        assert_eq!(definition.metadata().get("owner"), Some(&json!("ops")));
    }

    #[test]
    fn test_validate_unknown_successor() {
        let mut definition = WorkflowDefinition::new("wf", "Workflow", "");
        definition
            .add_step(task("a").with_next_steps(["missing"]))
            .unwrap();

        assert!(matches!(
            definition.validate(),
            Err(DefinitionError::UnknownSuccessor { .. })
        ));
    }

    #[test]
    fn test_validate_cycle() {
        let mut definition = WorkflowDefinition::new("wf", "Workflow", "");
        definition.add_step(task("a").with_next_steps(["b"])).unwrap();
        definition.add_step(task("b").with_next_steps(["a"])).unwrap();

        assert_eq!(
            definition.validate(),
            Err(DefinitionError::Cycle("a".to_string()))
        );
    }

    #[test]
    fn test_validate_linear_chain() {
        let definition = WorkflowDefinition::builder("wf", "Workflow", "")
            .step(task("a"))
            .step(task("b"))
            .auto_link()
            .build()
            .unwrap();

        assert_eq!(definition.validate(), Ok(()));
    }

    #[test]
    fn test_builder_auto_link_keeps_declared_successors() {
        let definition = WorkflowDefinition::builder("wf", "Workflow", "")
            .step(task("a").with_next_steps(["c"]))
            .step(task("b"))
            .step(task("c"))
            .metadata("team", json!("payments"))
            .auto_link()
            .build()
            .unwrap();

        assert_eq!(definition.step("a").unwrap().next_step(), Some("c"));
        assert_eq!(definition.step("b").unwrap().next_step(), Some("c"));
        assert!(definition.step("c").unwrap().is_terminal());
        assert_eq!(definition.version(), 1);
        assert_eq!(definition.metadata().get("team"), Some(&json!("payments")));
    }

    #[test]
    fn test_builder_without_auto_link() {
        let definition = WorkflowDefinition::builder("wf", "Workflow", "")
            .step(task("a"))
            .step(task("b"))
            .build()
            .unwrap();

        assert!(definition.step("a").unwrap().is_terminal());
    }

    #[test]
    fn test_builder_duplicate() {
        let result = WorkflowDefinition::builder("wf", "Workflow", "")
            .step(task("a"))
            .step(task("a"))
            .build();

        assert!(matches!(result, Err(DefinitionError::DuplicateStep(_))));
    }

    #[test]
    fn test_definition_serialization() {
        let definition = WorkflowDefinition::builder("wf", "Workflow", "desc")
            .step(task("a"))
            .step(task("b"))
            .auto_link()
            .build()
            .unwrap();

        let json = serde_json::to_string(&definition).unwrap();
        let parsed: WorkflowDefinition = serde_json::from_str(&json).unwrap();

        assert_eq!(definition, parsed);
    }

    #[test]
    fn test_deserialize_rejects_duplicate_steps() {
        let mut value = serde_json::to_value(
            WorkflowDefinition::builder("wf", "Workflow", "")
                .step(task("a"))
                .build()
                .unwrap(),
        )
        .unwrap();
        let step = value["steps"][0].clone();
        value["steps"].as_array_mut().unwrap().push(step);

        let err = serde_json::from_value::<WorkflowDefinition>(value).unwrap_err();

        assert!(err.to_string().contains("duplicate step id: a"));
    }

    #[test]
    fn test_deserialize_without_metadata() {
        let definition = WorkflowDefinition::new("wf", "Workflow", "");
        let mut value = serde_json::to_value(&definition).unwrap();
        value.as_object_mut().unwrap().remove("metadata");

        let parsed: WorkflowDefinition = serde_json::from_value(value).unwrap();

        assert!(parsed.metadata().is_empty());
        assert_eq!(parsed.version(), 1);
    }
}
