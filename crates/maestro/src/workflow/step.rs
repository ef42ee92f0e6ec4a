//! Step descriptors and per-step policy

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::reliability::RetryPolicy;
use crate::serde_util::duration_millis;

/// Kind of a step
///
/// The kernel carries the kind through untouched; it does not branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Plain unit of work
    #[default]
    Task,
    /// Waits for a human or external approval
    Approval,
    /// Selects between successors (not evaluated by the kernel)
    Decision,
    /// Long-running processing step
    Process,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::Approval => write!(f, "approval"),
            Self::Decision => write!(f, "decision"),
            Self::Process => write!(f, "process"),
        }
    }
}

/// Declarative descriptor of one step inside a workflow definition
///
/// # Example
///
/// ```
/// use maestro::{RetryPolicy, StepDefinition, StepKind};
/// use std::time::Duration;
///
/// let step = StepDefinition::new("charge", "Charge card", StepKind::Task)
///     .with_timeout(Duration::from_secs(10))
///     .with_retry_policy(RetryPolicy::exponential().with_max_attempts(4))
///     .with_next_steps(["ship"]);
///
/// assert_eq!(step.next_step(), Some("ship"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepDefinition {
    /// Identifier, unique within a definition; also the registry key
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Kind tag
    #[serde(rename = "type")]
    pub kind: StepKind,

    /// Free-form configuration
    #[serde(default)]
    pub config: Map<String, Value>,

    /// Successor identifiers; only the first is followed
    #[serde(default)]
    pub next_steps: Vec<String>,

    /// Retry policy applied when the step fails
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,

    /// Step timeout; zero means unbounded
    #[serde(default, with = "duration_millis")]
    pub timeout: Duration,
}

impl StepDefinition {
    /// Create a step descriptor with no successors, retries or timeout
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            config: Map::new(),
            next_steps: vec![],
            retry_policy: None,
            timeout: Duration::ZERO,
        }
    }

    /// Replace the configuration mapping
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Set a single configuration value
    pub fn with_config_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Replace the successor list
    pub fn with_next_steps<I, S>(mut self, next_steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_steps = next_steps.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Set the step timeout (zero disables it)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The successor the runtime follows, if any
    pub fn next_step(&self) -> Option<&str> {
        self.next_steps.first().map(String::as_str)
    }

    /// Whether the runtime stops after this step
    pub fn is_terminal(&self) -> bool {
        self.next_steps.is_empty()
    }

    /// Timeout as an option, `None` when unbounded
    pub fn timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}
