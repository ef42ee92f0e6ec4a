//! Step abstractions
//!
//! Steps are the units of work a workflow chains together. They:
//! - Receive the run's shared [`WorkflowContext`]
//! - Return a JSON output or a [`StepError`]
//! - Observe a [`StepScope`] for timeouts and cancellation

mod context;
mod definition;
mod scope;

pub use context::WorkflowContext;
pub(crate) use definition::step_handler;
pub use definition::{
    error_types, step_fn, Step, StepError, StepFn, StepFuture, StepResult,
};
pub use scope::{ScopeError, StepScope};
