//! Workflow runtime driving one run of a definition

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::engine::{EngineError, WorkflowEngine};
use crate::step::{StepError, StepScope, WorkflowContext};
use crate::workflow::{StepDefinition, WorkflowDefinition};

use super::state::{WorkflowState, WorkflowStatus};

/// Errors from runtime operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// The engine has no procedure for a step of the definition
    #[error("step not found: {0}")]
    StepNotFound(String),

    /// The chain names a step the definition does not contain
    #[error("step missing from definition: {0}")]
    StepMissing(String),

    /// The definition has no steps
    #[error("workflow has no steps")]
    EmptyWorkflow,

    /// `start` was called on a run that is not pending
    #[error("workflow already started")]
    AlreadyStarted,

    /// `cancel` was called on a run that is not running
    #[error("workflow is not running")]
    NotRunning,

    /// A step procedure returned an error
    #[error("step {step_id} failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: StepError,
    },

    /// The run was cancelled while a step was in flight
    #[error("workflow canceled")]
    Canceled,

    /// The run executed more steps than the configured limit
    #[error("workflow exceeded {0} step transitions")]
    TransitionLimitExceeded(usize),
}

impl RuntimeError {
    /// The step error behind a [`RuntimeError::StepFailed`]
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            Self::StepFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<EngineError> for RuntimeError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::StepNotFound(step_id) => Self::StepNotFound(step_id),
            EngineError::StepFailed { step_id, source } => Self::StepFailed { step_id, source },
        }
    }
}

/// Stateful driver of one execution of one definition
///
/// The runtime walks the chain on the task that calls [`start`], one step at
/// a time, starting at the definition's first step and following each step's
/// first successor. Every step receives a clone of the same
/// [`WorkflowContext`]; step outputs are recorded in the run's results but
/// are not passed on as input.
///
/// State is kept behind a read/write lock that is never held while a step
/// runs, so [`state_snapshot`] and [`cancel`] may be called from other tasks
/// at any time.
///
/// [`start`]: WorkflowRuntime::start
/// [`state_snapshot`]: WorkflowRuntime::state_snapshot
/// [`cancel`]: WorkflowRuntime::cancel
///
/// # Example
///
/// ```ignore
/// use maestro::prelude::*;
///
/// let runtime = Arc::new(WorkflowRuntime::new(engine.clone(), Arc::new(definition)));
///
/// let handle = tokio::spawn({
///     let runtime = runtime.clone();
///     async move { runtime.start(&StepScope::new()).await }
/// });
///
/// // Later, from anywhere:
/// runtime.cancel()?;
/// ```
pub struct WorkflowRuntime {
    engine: Arc<WorkflowEngine>,
    definition: Arc<WorkflowDefinition>,
    config: RuntimeConfig,
    run_id: Uuid,
    context: WorkflowContext,
    state: RwLock<WorkflowState>,
    in_flight: Mutex<Option<StepScope>>,
}

impl WorkflowRuntime {
    /// Create a pending run with the default configuration
    pub fn new(engine: Arc<WorkflowEngine>, definition: Arc<WorkflowDefinition>) -> Self {
        let run_id = Uuid::now_v7();
        Self {
            engine,
            definition,
            config: RuntimeConfig::default(),
            run_id,
            context: WorkflowContext::new(),
            state: RwLock::new(WorkflowState::new(run_id)),
            in_flight: Mutex::new(None),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed the shared context before the run starts
    pub fn with_context(mut self, context: WorkflowContext) -> Self {
        self.context = context;
        self
    }

    /// Run identifier
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The definition this run executes
    pub fn definition(&self) -> &Arc<WorkflowDefinition> {
        &self.definition
    }

    /// Handle to the shared context passed to every step
    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    /// Current status
    pub fn status(&self) -> WorkflowStatus {
        self.state.read().status
    }

    /// By-value copy of the run state
    pub fn state_snapshot(&self) -> WorkflowState {
        let mut snapshot = self.state.read().clone();
        snapshot.context = self.context.snapshot();
        snapshot
    }

    /// Walk the step chain until the run reaches a terminal status
    ///
    /// Each step runs under a child of `scope`, bounded by the step timeout
    /// (or the configured default). Steps with a retry policy are retried by
    /// the engine before the run is failed.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::AlreadyStarted`] if the run is not pending
    /// - [`RuntimeError::EmptyWorkflow`] if the definition has no steps;
    ///   the status stays pending
    /// - the error that failed the run, also recorded in the state
    /// - [`RuntimeError::Canceled`] if [`cancel`](Self::cancel) ended the run
    ///
    /// Dropping the returned future before it resolves cancels the run and
    /// the scope of the step in flight.
    #[instrument(skip(self, scope), fields(run_id = %self.run_id, workflow_id = %self.definition.id()))]
    pub async fn start(&self, scope: &StepScope) -> Result<(), RuntimeError> {
        let mut current = {
            let mut state = self.state.write();
            if state.status != WorkflowStatus::Pending {
                return Err(RuntimeError::AlreadyStarted);
            }
            let first = self
                .definition
                .first_step()
                .ok_or(RuntimeError::EmptyWorkflow)?;

            state.status = WorkflowStatus::Running;
            state.started_at = Some(chrono::Utc::now());
            state.current_step_id = Some(first.id.clone());
            first.id.clone()
        };
        let _abandon = AbandonGuard { runtime: self };
        info!(steps = self.definition.len(), "workflow started");

        let mut transitions = 0usize;
        loop {
            if let Some(limit) = self.config.max_transitions {
                if transitions >= limit {
                    return self.fail(RuntimeError::TransitionLimitExceeded(limit));
                }
            }
            transitions += 1;

            let Some(step) = self.definition.step(&current) else {
                return self.fail(RuntimeError::StepMissing(current));
            };

            let output = match self.run_step(scope, step).await {
                Ok(output) => output,
                Err(err) => return self.fail(err),
            };

            let mut state = self.state.write();
            state.results.insert(current.clone(), output);
            if state.status != WorkflowStatus::Running {
                debug!(step_id = %current, status = %state.status, "ignoring transition after terminal status");
                return Err(RuntimeError::Canceled);
            }

            match step.next_step() {
                Some(next) => {
                    debug!(step_id = %current, next_step_id = next, "advancing");
                    state.current_step_id = Some(next.to_string());
                    current = next.to_string();
                }
                None => {
                    state.finish(WorkflowStatus::Completed);
                    info!(step_id = %current, "workflow completed");
                    return Ok(());
                }
            }
        }
    }

    /// Cancel a running run
    ///
    /// The status becomes canceled immediately. Unless disabled in the
    /// configuration, the scope of the step in flight is cancelled too; a
    /// step that ignores its scope runs to completion but its result no
    /// longer moves the run.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotRunning`] if the run is pending or terminal.
    pub fn cancel(&self) -> Result<(), RuntimeError> {
        {
            let mut state = self.state.write();
            if state.status != WorkflowStatus::Running {
                return Err(RuntimeError::NotRunning);
            }
            state.finish(WorkflowStatus::Canceled);
        }
        info!(run_id = %self.run_id, "workflow canceled");

        if self.config.abort_in_flight_on_cancel {
            if let Some(scope) = self.in_flight.lock().as_ref() {
                scope.cancel();
            }
        }
        Ok(())
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    async fn run_step(
        &self,
        scope: &StepScope,
        step: &StepDefinition,
    ) -> Result<Value, RuntimeError> {
        let step_scope = match step.timeout().or(self.config.default_step_timeout) {
            Some(timeout) => scope.with_timeout(timeout),
            None => scope.child(),
        };
        let _release = step_scope.release_guard();

        *self.in_flight.lock() = Some(step_scope.clone());
        if self.status() != WorkflowStatus::Running {
            *self.in_flight.lock() = None;
            return Err(RuntimeError::Canceled);
        }

        let result = match &step.retry_policy {
            Some(policy) => {
                self.engine
                    .execute_step_with_retry(&step_scope, &step.id, self.context.clone(), policy)
                    .await
            }
            None => {
                self.engine
                    .execute_step(&step_scope, &step.id, self.context.clone())
                    .await
            }
        };

        *self.in_flight.lock() = None;
        result.map_err(RuntimeError::from)
    }

    fn fail(&self, err: RuntimeError) -> Result<(), RuntimeError> {
        let mut state = self.state.write();
        if state.status != WorkflowStatus::Running {
            warn!(error = %err, status = %state.status, "run already terminal, not recording error");
            return Err(RuntimeError::Canceled);
        }
        state.error = Some(err.clone());
        state.finish(WorkflowStatus::Failed);
        error!(error = %err, "workflow failed");
        Err(err)
    }
}

/// Cancels a run whose `start` future is dropped while it is still running
struct AbandonGuard<'a> {
    runtime: &'a WorkflowRuntime,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        let runtime = self.runtime;
        if !runtime.state.write().finish(WorkflowStatus::Canceled) {
            return;
        }
        warn!(run_id = %runtime.run_id, "start dropped mid-run, workflow canceled");
        if let Some(scope) = runtime.in_flight.lock().take() {
            scope.cancel();
        }
    }
}

impl std::fmt::Debug for WorkflowRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRuntime")
            .field("run_id", &self.run_id)
            .field("workflow_id", &self.definition.id())
            .field("status", &self.status())
            .field("config", &self.config)
            .finish()
    }
}
