//! Workflow engine
//!
//! The `WorkflowEngine` is responsible for:
//! - Holding the step registry and the event bus
//! - Running a single step by identifier and reporting its lifecycle
//! - Retrying failed steps under a [`RetryPolicy`]

use std::future::Future;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::reliability::RetryPolicy;
use crate::step::{
    step_fn, step_handler, Step, StepError, StepFn, StepResult, StepScope, WorkflowContext,
};

use super::events::{EventBus, StepEvent, StepObserver};
use super::registry::StepRegistry;

/// Errors from engine operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// No procedure is registered under the identifier
    #[error("step not found: {0}")]
    StepNotFound(String),

    /// The procedure returned an error
    #[error("step {step_id} failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: StepError,
    },
}

impl EngineError {
    /// Identifier of the step the error is about
    pub fn step_id(&self) -> &str {
        match self {
            Self::StepNotFound(step_id) | Self::StepFailed { step_id, .. } => step_id,
        }
    }
}

/// Workflow engine
///
/// Executes individual steps by identifier and notifies observers of each
/// lifecycle transition. The engine keeps no per-run state; many runtimes can
/// share one engine behind an `Arc`.
///
/// # Example
///
/// ```ignore
/// use maestro::prelude::*;
///
/// let engine = WorkflowEngine::new();
/// engine.register("validate", |_scope, _ctx| async { Ok(json!("validated")) });
/// engine.subscribe(TracingObserver);
///
/// let output = engine
///     .execute_step(&StepScope::new(), "validate", WorkflowContext::new())
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct WorkflowEngine {
    registry: StepRegistry,
    events: EventBus,
}

impl WorkflowEngine {
    /// Create an engine with an empty registry and no observers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async closure as a step procedure
    pub fn register<F, Fut>(&self, id: impl Into<String>, f: F)
    where
        F: Fn(StepScope, WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        self.register_handler(id, step_fn(f));
    }

    /// Register a [`Step`] implementation
    pub fn register_step<S: Step>(&self, id: impl Into<String>, step: S) {
        self.register_handler(id, step_handler(step));
    }

    /// Register a type-erased step procedure
    pub fn register_handler(&self, id: impl Into<String>, handler: StepFn) {
        let id = id.into();
        if self.registry.register(id.clone(), handler) {
            debug!(step_id = %id, "replaced step registration");
        } else {
            info!(step_id = %id, "registered step");
        }
    }

    /// Subscribe an observer to step events
    pub fn subscribe(&self, observer: impl StepObserver + 'static) {
        self.events.subscribe(observer);
    }

    /// Get a reference to the registry
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Get a reference to the event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Execute a registered step once
    ///
    /// Emits `step_started` before invoking the procedure and exactly one of
    /// `step_completed` or `step_failed` after it. An unknown identifier
    /// emits nothing.
    ///
    /// # Errors
    ///
    /// [`EngineError::StepNotFound`] when nothing is registered under
    /// `step_id`, [`EngineError::StepFailed`] carrying the procedure's error
    /// unchanged otherwise.
    #[instrument(skip(self, scope, input))]
    pub async fn execute_step(
        &self,
        scope: &StepScope,
        step_id: &str,
        input: WorkflowContext,
    ) -> Result<Value, EngineError> {
        self.run_step(scope, step_id, input, None).await
    }

    /// Execute a registered step, retrying failures under `policy`
    ///
    /// Observers see a single `step_started` and a single terminal event
    /// regardless of how many attempts were made. Retrying stops when the
    /// policy's attempts are used up, when the error is not retryable, or
    /// when `scope` ends; a scope that ends during backoff fails the step
    /// with the scope's reason.
    #[instrument(skip(self, scope, input, policy), fields(max_attempts = policy.max_attempts))]
    pub async fn execute_step_with_retry(
        &self,
        scope: &StepScope,
        step_id: &str,
        input: WorkflowContext,
        policy: &RetryPolicy,
    ) -> Result<Value, EngineError> {
        self.run_step(scope, step_id, input, Some(policy)).await
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    async fn run_step(
        &self,
        scope: &StepScope,
        step_id: &str,
        input: WorkflowContext,
        policy: Option<&RetryPolicy>,
    ) -> Result<Value, EngineError> {
        let step = self
            .registry
            .lookup(step_id)
            .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))?;

        self.events.emit(StepEvent::started(step_id, input.to_value()));
        debug!(step_id, "step started");

        let mut attempt: u32 = 1;
        let result = loop {
            let err = match step(scope.clone(), input.clone()).await {
                Ok(output) => break Ok(output),
                Err(err) => err,
            };

            let Some(policy) = policy else {
                break Err(err);
            };
            if !policy.has_attempts_remaining(attempt) || !policy.should_retry(&err) {
                break Err(err);
            }

            let delay = policy.backoff(attempt - 1);
            attempt += 1;
            warn!(step_id, attempt, ?delay, error = %err, "step failed, retrying");

            if let Err(reason) = scope.sleep(delay).await {
                debug!(step_id, %reason, "scope ended during retry backoff");
                break Err(StepError::from(reason));
            }
        };

        match result {
            Ok(output) => {
                self.events.emit(StepEvent::completed(step_id, output.clone()));
                debug!(step_id, attempt, "step completed");
                Ok(output)
            }
            Err(source) => {
                self.events.emit(StepEvent::failed(step_id, source.clone()));
                warn!(step_id, attempt, error = %source, "step failed");
                Err(EngineError::StepFailed {
                    step_id: step_id.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::engine::StepEventType;

    fn recording_engine() -> (WorkflowEngine, Arc<Mutex<Vec<StepEvent>>>) {
        let engine = WorkflowEngine::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine.subscribe(move |event: &StepEvent| sink.lock().push(event.clone()));
        (engine, events)
    }

    fn event_types(events: &Mutex<Vec<StepEvent>>) -> Vec<StepEventType> {
        events.lock().iter().map(|e| e.event_type).collect()
    }

    #[tokio::test]
    async fn test_execute_step_success() {
        let (engine, events) = recording_engine();
        engine.register("validate", |_, _| async { Ok(json!("validated")) });

        let ctx = WorkflowContext::new();
        ctx.insert("order_id", json!(42));

        let output = engine
            .execute_step(&StepScope::new(), "validate", ctx)
            .await
            .unwrap();

        assert_eq!(output, json!("validated"));
        assert_eq!(
            event_types(&events),
            vec![StepEventType::StepStarted, StepEventType::StepCompleted]
        );

        let recorded = events.lock();
        assert_eq!(
            recorded[0].payload,
            crate::engine::EventPayload::Input(json!({"order_id": 42}))
        );
        assert_eq!(recorded[1].output(), Some(&json!("validated")));
    }

    #[tokio::test]
    async fn test_execute_step_failure_forwards_error() {
        let (engine, events) = recording_engine();
        engine.register("charge", |_, _| async {
            Err(StepError::non_retryable("card declined").with_type("DECLINED"))
        });

        let err = engine
            .execute_step(&StepScope::new(), "charge", WorkflowContext::new())
            .await
            .unwrap_err();

        match err {
            EngineError::StepFailed { step_id, source } => {
                assert_eq!(step_id, "charge");
                assert_eq!(source.message, "card declined");
                assert_eq!(source.error_type.as_deref(), Some("DECLINED"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            event_types(&events),
            vec![StepEventType::StepStarted, StepEventType::StepFailed]
        );
    }

    #[tokio::test]
    async fn test_unknown_step_emits_nothing() {
        let (engine, events) = recording_engine();

        let err = engine
            .execute_step(&StepScope::new(), "ghost", WorkflowContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::StepNotFound(ref id) if id == "ghost"));
        assert_eq!(err.step_id(), "ghost");
        assert!(events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_register_step_impl() {
        struct Double;

        #[async_trait]
        impl Step for Double {
            async fn execute(&self, _scope: StepScope, ctx: WorkflowContext) -> StepResult {
                let n = ctx.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(json!(n * 2))
            }
        }

        let engine = WorkflowEngine::new();
        engine.register_step("double", Double);

        let ctx = WorkflowContext::new();
        ctx.insert("n", json!(21));

        let output = engine
            .execute_step(&StepScope::new(), "double", ctx)
            .await
            .unwrap();
        assert_eq!(output, json!(42));
        assert!(engine.registry().contains("double"));
    }

    #[tokio::test]
    async fn test_step_writes_are_visible_to_caller() {
        let engine = WorkflowEngine::new();
        engine.register("mark", |_, ctx: WorkflowContext| async move {
            ctx.insert("marked", json!(true));
            Ok(Value::Null)
        });

        let ctx = WorkflowContext::new();
        engine
            .execute_step(&StepScope::new(), "mark", ctx.clone())
            .await
            .unwrap();

        assert_eq!(ctx.get("marked"), Some(json!(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let (engine, events) = recording_engine();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        engine.register("flaky", move |_, _| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StepError::retryable("transient"))
                } else {
                    Ok(json!("ok"))
                }
            }
        });

        let policy = RetryPolicy::fixed(Duration::from_millis(100), 5);
        let started = tokio::time::Instant::now();
        let output = engine
            .execute_step_with_retry(&StepScope::new(), "flaky", WorkflowContext::new(), &policy)
            .await
            .unwrap();

        assert_eq!(output, json!("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(
            event_types(&events),
            vec![StepEventType::StepStarted, StepEventType::StepCompleted]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_attempts() {
        let (engine, events) = recording_engine();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        engine.register("down", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(StepError::retryable("service unavailable")) }
        });

        let policy = RetryPolicy::exponential()
            .with_max_attempts(3)
            .with_initial_interval(Duration::from_millis(10));
        let err = engine
            .execute_step_with_retry(&StepScope::new(), "down", WorkflowContext::new(), &policy)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::StepFailed { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            event_types(&events),
            vec![StepEventType::StepStarted, StepEventType::StepFailed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_retrying() {
        let engine = WorkflowEngine::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        engine.register("validate", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(StepError::non_retryable("invalid order")) }
        });

        let policy = RetryPolicy::fixed(Duration::from_millis(10), 5);
        let result = engine
            .execute_step_with_retry(&StepScope::new(), "validate", WorkflowContext::new(), &policy)
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_deadline_interrupts_backoff() {
        let engine = WorkflowEngine::new();
        engine.register("slow-retry", |_, _| async {
            Err(StepError::retryable("try later"))
        });

        let scope = StepScope::new().with_timeout(Duration::from_millis(50));
        let policy = RetryPolicy::fixed(Duration::from_secs(10), 5);
        let err = engine
            .execute_step_with_retry(&scope, "slow-retry", WorkflowContext::new(), &policy)
            .await
            .unwrap_err();

        match err {
            EngineError::StepFailed { source, .. } => assert!(source.is_deadline_exceeded()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plain_execute_never_retries() {
        let engine = WorkflowEngine::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        engine.register("once", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(StepError::retryable("transient")) }
        });

        let _ = engine
            .execute_step(&StepScope::new(), "once", WorkflowContext::new())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::StepFailed {
            step_id: "ship".to_string(),
            source: StepError::new("carrier offline"),
        };
        assert_eq!(err.to_string(), "step ship failed: carrier offline");
        assert_eq!(
            EngineError::StepNotFound("x".into()).to_string(),
            "step not found: x"
        );
    }
}
