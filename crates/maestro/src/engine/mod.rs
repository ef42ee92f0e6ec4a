//! Step execution engine
//!
//! The engine module provides the `WorkflowEngine`, which runs registered
//! step procedures by identifier and reports each lifecycle transition to
//! subscribed observers.

mod events;
mod executor;
mod registry;

pub use events::{
    ChannelObserver, EventBus, EventPayload, StepEvent, StepEventType, StepObserver,
    TracingObserver,
};
pub use executor::{EngineError, WorkflowEngine};
pub use registry::StepRegistry;
