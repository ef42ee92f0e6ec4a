//! Workflow definitions
//!
//! This module contains the declarative side of a workflow:
//! - [`StepDefinition`] descriptors with per-step policy
//! - [`WorkflowDefinition`] ordered step lists plus identity metadata
//! - [`WorkflowDefinitionBuilder`] for fluent construction

mod definition;
mod step;

pub use definition::{DefinitionError, WorkflowDefinition, WorkflowDefinitionBuilder};
pub use step::{StepDefinition, StepKind};
