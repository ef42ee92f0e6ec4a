//! # Maestro Workflow Kernel
//!
//! An in-process engine that runs linearly chained step procedures.
//!
//! ## Features
//!
//! - **Step registry**: Async step procedures registered by identifier and shared across runs
//! - **Event bus**: Observers notified synchronously of every step start, completion and failure
//! - **Per-step timeouts**: Each step runs under a derived cancellation scope with its own deadline
//! - **Retries**: Exponential backoff with jitter for steps that declare a retry policy
//! - **Cancellation**: External cancel marks the run and interrupts the step in flight
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowRuntime                         │
//! │  (one run: walks the step chain, owns state, handles cancel)│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowEngine                          │
//! │  (shared: runs a step by id, retries, emits step events)    │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌───────────────────────────┐  ┌───────────────────────────────┐
//! │       StepRegistry        │  │           EventBus            │
//! │  (id -> step procedure)   │  │  (ordered StepObservers)      │
//! └───────────────────────────┘  └───────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use maestro::prelude::*;
//!
//! let engine = Arc::new(WorkflowEngine::new());
//! engine.register("validate", |_scope, ctx: WorkflowContext| async move {
//!     ctx.insert("validated", json!(true));
//!     Ok(json!("validated"))
//! });
//! engine.register("notify", |_scope, _ctx| async { Ok(json!("notified")) });
//! engine.subscribe(TracingObserver);
//!
//! let definition = WorkflowDefinition::builder("order-flow", "Orders", "Process new orders")
//!     .step(StepDefinition::new("validate", "Validate", StepKind::Task))
//!     .step(StepDefinition::new("notify", "Notify", StepKind::Task))
//!     .auto_link()
//!     .build()?;
//!
//! let runtime = WorkflowRuntime::new(engine, Arc::new(definition));
//! runtime.start(&StepScope::new()).await?;
//!
//! assert_eq!(runtime.status(), WorkflowStatus::Completed);
//! ```

pub mod config;
pub mod engine;
pub mod reliability;
pub mod runtime;
pub mod step;
pub mod workflow;

mod serde_util;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::RuntimeConfig;
    pub use crate::engine::{
        EngineError, EventBus, EventPayload, StepEvent, StepEventType, StepObserver,
        TracingObserver, WorkflowEngine,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::runtime::{RuntimeError, WorkflowRuntime, WorkflowState, WorkflowStatus};
    pub use crate::step::{
        step_fn, ScopeError, Step, StepError, StepResult, StepScope, WorkflowContext,
    };
    pub use crate::workflow::{DefinitionError, StepDefinition, StepKind, WorkflowDefinition};

    pub use async_trait::async_trait;
    pub use serde_json::{json, Value};
    pub use std::sync::Arc;
}

// Re-export key types at crate root
pub use config::RuntimeConfig;
pub use engine::{
    EngineError, EventBus, StepEvent, StepEventType, StepObserver, StepRegistry, WorkflowEngine,
};
pub use reliability::RetryPolicy;
pub use runtime::{RuntimeError, WorkflowRuntime, WorkflowState, WorkflowStatus};
pub use step::{
    step_fn, ScopeError, Step, StepError, StepFn, StepResult, StepScope, WorkflowContext,
};
pub use workflow::{
    DefinitionError, StepDefinition, StepKind, WorkflowDefinition, WorkflowDefinitionBuilder,
};
