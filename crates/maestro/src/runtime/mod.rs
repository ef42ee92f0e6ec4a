//! Workflow runtime
//!
//! A `WorkflowRuntime` owns the state of one run of a definition and walks
//! its step chain through a shared `WorkflowEngine`.

mod driver;
mod state;

pub use driver::{RuntimeError, WorkflowRuntime};
pub use state::{WorkflowState, WorkflowStatus};
