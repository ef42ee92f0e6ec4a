//! Run status and state snapshots

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::RuntimeError;

/// Status of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Run created but not started
    #[default]
    Pending,

    /// Run is walking its step chain
    Running,

    /// Last step succeeded without a successor
    Completed,

    /// A step failed or could not be resolved
    Failed,

    /// Run was cancelled externally
    Canceled,
}

impl WorkflowStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// By-value copy of a run's state
///
/// `completed_at` is set exactly when `status` is terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    /// Run identifier
    pub run_id: Uuid,

    /// Step being executed, or the last one executed
    pub current_step_id: Option<String>,

    /// Current status
    pub status: WorkflowStatus,

    /// Shared context values at the time of the snapshot
    pub context: Map<String, Value>,

    /// Output of every step that returned successfully, by step id
    pub results: HashMap<String, Value>,

    /// When `start` began the run
    pub started_at: Option<DateTime<Utc>>,

    /// When the run reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,

    /// Error that failed the run
    pub error: Option<RuntimeError>,
}

impl WorkflowState {
    pub(crate) fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            current_step_id: None,
            status: WorkflowStatus::Pending,
            context: Map::new(),
            results: HashMap::new(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Output recorded for a step
    pub fn result(&self, step_id: &str) -> Option<&Value> {
        self.results.get(step_id)
    }

    /// Whether the run has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock time between start and completion
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }

    /// Mark a terminal status; returns `false` if already terminal
    pub(crate) fn finish(&mut self, status: WorkflowStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        true
    }
}
