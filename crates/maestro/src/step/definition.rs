//! Step procedure contract

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ScopeError, StepScope, WorkflowContext};

/// Error type codes produced by the kernel itself
pub mod error_types {
    /// The step's scope deadline passed
    pub const DEADLINE_EXCEEDED: &str = "DEADLINE_EXCEEDED";

    /// The step's scope was cancelled
    pub const CANCELLED: &str = "CANCELLED";
}

/// Error returned by a step procedure
///
/// The engine never inspects the message; it forwards the error to observers
/// and to the runtime unchanged. `error_type` and `retryable` drive the retry
/// loop when the step declares a [`RetryPolicy`](crate::RetryPolicy).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepError {
    /// Error message
    pub message: String,

    /// Error type/code for programmatic handling
    pub error_type: Option<String>,

    /// Whether another attempt may succeed
    pub retryable: bool,

    /// Additional error details (for debugging)
    pub details: Option<Value>,
}

impl StepError {
    /// Create a new retryable error
    pub fn new(message: impl Into<String>) -> Self {
        Self::retryable(message)
    }

    /// Create a new retryable error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable: true,
            details: None,
        }
    }

    /// Create a non-retryable error
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable: false,
            details: None,
        }
    }

    /// Error for a step that outlived its scope deadline
    pub fn deadline_exceeded() -> Self {
        Self::non_retryable("step deadline exceeded").with_type(error_types::DEADLINE_EXCEEDED)
    }

    /// Error for a step whose scope was cancelled
    pub fn cancelled() -> Self {
        Self::non_retryable("step cancelled").with_type(error_types::CANCELLED)
    }

    /// Set the error type
    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    /// Add error details
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether this error reports an exceeded scope deadline
    pub fn is_deadline_exceeded(&self) -> bool {
        self.error_type.as_deref() == Some(error_types::DEADLINE_EXCEEDED)
    }

    /// Whether this error reports a cancelled scope
    pub fn is_cancelled(&self) -> bool {
        self.error_type.as_deref() == Some(error_types::CANCELLED)
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StepError {}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        Self::retryable(err.to_string())
    }
}

impl From<ScopeError> for StepError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::Cancelled => Self::cancelled(),
            ScopeError::DeadlineExceeded => Self::deadline_exceeded(),
        }
    }
}

/// Result of a single step invocation
pub type StepResult = Result<Value, StepError>;

/// Future returned by a registered step procedure
pub type StepFuture = BoxFuture<'static, StepResult>;

/// Type-erased step procedure stored in the registry
pub type StepFn = Arc<dyn Fn(StepScope, WorkflowContext) -> StepFuture + Send + Sync>;

/// Box an async closure into a [`StepFn`]
pub fn step_fn<F, Fut>(f: F) -> StepFn
where
    F: Fn(StepScope, WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    Arc::new(move |scope, ctx| Box::pin(f(scope, ctx)))
}

/// A step is a unit of work executed by the engine
///
/// Steps receive the run's shared [`WorkflowContext`] and a [`StepScope`]
/// they must observe to be interruptible by timeouts or cancellation.
///
/// # Example
///
/// ```ignore
/// use maestro::prelude::*;
///
/// struct Validate;
///
/// #[async_trait]
/// impl Step for Validate {
///     async fn execute(&self, scope: StepScope, ctx: WorkflowContext) -> StepResult {
///         scope.run(check_inventory(&ctx)).await??;
///         ctx.insert("validated", json!(true));
///         Ok(json!("validated"))
///     }
/// }
///
/// engine.register_step("validate", Validate);
/// ```
#[async_trait]
pub trait Step: Send + Sync + 'static {
    /// Execute the step
    ///
    /// # Errors
    ///
    /// Return `StepError::retryable()` for transient failures that a retry
    /// policy may absorb, `StepError::non_retryable()` for permanent ones.
    async fn execute(&self, scope: StepScope, ctx: WorkflowContext) -> StepResult;
}

/// Adapt a [`Step`] implementation into a [`StepFn`]
pub(crate) fn step_handler<S: Step>(step: S) -> StepFn {
    let step = Arc::new(step);
    Arc::new(move |scope, ctx| {
        let step = step.clone();
        Box::pin(async move { step.execute(scope, ctx).await })
    })
}
