//! Runtime configuration

use std::time::Duration;

/// Environment variable holding the default step timeout in milliseconds
pub const ENV_DEFAULT_STEP_TIMEOUT_MS: &str = "MAESTRO_DEFAULT_STEP_TIMEOUT_MS";

/// Environment variable holding the transition limit per run
pub const ENV_MAX_TRANSITIONS: &str = "MAESTRO_MAX_TRANSITIONS";

/// Environment variable toggling in-flight step cancellation
pub const ENV_ABORT_ON_CANCEL: &str = "MAESTRO_ABORT_ON_CANCEL";

/// Configuration for a [`WorkflowRuntime`](crate::WorkflowRuntime)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Timeout applied to steps that declare none
    pub default_step_timeout: Option<Duration>,

    /// Maximum step executions per run (guards against successor cycles)
    pub max_transitions: Option<usize>,

    /// Whether `cancel` also cancels the scope of the step in flight
    pub abort_in_flight_on_cancel: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_step_timeout: None,
            max_transitions: None,
            abort_in_flight_on_cancel: true,
        }
    }
}

impl RuntimeConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `MAESTRO_*` environment variables
    ///
    /// Unset or unparsable variables keep their default. A zero timeout or
    /// transition limit means unbounded.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let default_step_timeout = lookup(ENV_DEFAULT_STEP_TIMEOUT_MS)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let max_transitions = lookup(ENV_MAX_TRANSITIONS)
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0);

        let abort_in_flight_on_cancel = lookup(ENV_ABORT_ON_CANCEL)
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.abort_in_flight_on_cancel);

        Self {
            default_step_timeout,
            max_transitions,
            abort_in_flight_on_cancel,
        }
    }

    /// Set the timeout for steps that declare none
    pub fn with_default_step_timeout(mut self, timeout: Duration) -> Self {
        self.default_step_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Limit the number of step executions per run
    pub fn with_max_transitions(mut self, max_transitions: usize) -> Self {
        self.max_transitions = (max_transitions > 0).then_some(max_transitions);
        self
    }

    /// Choose whether `cancel` interrupts the step in flight
    pub fn with_abort_in_flight_on_cancel(mut self, abort: bool) -> Self {
        self.abort_in_flight_on_cancel = abort;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
