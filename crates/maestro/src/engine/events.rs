//! Step lifecycle events and the synchronous event bus

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::step::StepError;

// ============================================================================
// Events
// ============================================================================

/// Lifecycle transition a [`StepEvent`] reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEventType {
    /// The step procedure is about to run
    StepStarted,
    /// The step procedure returned an output
    StepCompleted,
    /// The step procedure returned an error
    StepFailed,
}

impl fmt::Display for StepEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepStarted => write!(f, "step_started"),
            Self::StepCompleted => write!(f, "step_completed"),
            Self::StepFailed => write!(f, "step_failed"),
        }
    }
}

/// Data attached to a [`StepEvent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EventPayload {
    /// Input handed to the step (a snapshot of the run context)
    Input(Value),
    /// Output returned by the step
    Output(Value),
    /// Error returned by the step
    Error(StepError),
}

/// A step lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    /// Transition kind
    pub event_type: StepEventType,

    /// Step the event is about
    pub step_id: String,

    /// Input, output or error depending on the transition
    pub payload: EventPayload,

    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl StepEvent {
    /// A `step_started` event carrying the step input
    pub fn started(step_id: impl Into<String>, input: Value) -> Self {
        Self::new(StepEventType::StepStarted, step_id, EventPayload::Input(input))
    }

    /// A `step_completed` event carrying the step output
    pub fn completed(step_id: impl Into<String>, output: Value) -> Self {
        Self::new(
            StepEventType::StepCompleted,
            step_id,
            EventPayload::Output(output),
        )
    }

    /// A `step_failed` event carrying the step error
    pub fn failed(step_id: impl Into<String>, error: StepError) -> Self {
        Self::new(StepEventType::StepFailed, step_id, EventPayload::Error(error))
    }

    fn new(event_type: StepEventType, step_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            event_type,
            step_id: step_id.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// The error, for `step_failed` events
    pub fn error(&self) -> Option<&StepError> {
        match &self.payload {
            EventPayload::Error(error) => Some(error),
            _ => None,
        }
    }

    /// The output, for `step_completed` events
    pub fn output(&self) -> Option<&Value> {
        match &self.payload {
            EventPayload::Output(output) => Some(output),
            _ => None,
        }
    }
}

// ============================================================================
// StepObserver Trait
// ============================================================================

/// Receives every step event emitted on a bus
///
/// Observers run synchronously on the emitting task, in subscription order,
/// so they should be fast. A panicking observer is not isolated: the panic
/// unwinds into the emitter and the remaining observers miss that event.
///
/// Any `Fn(&StepEvent) + Send + Sync` closure is an observer.
pub trait StepObserver: Send + Sync {
    /// Called for every emitted event
    fn on_event(&self, event: &StepEvent);

    /// Human-readable name for logging/debugging
    fn name(&self) -> &'static str {
        "StepObserver"
    }
}

impl<F> StepObserver for F
where
    F: Fn(&StepEvent) + Send + Sync,
{
    fn on_event(&self, event: &StepEvent) {
        self(event)
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Ordered list of observers notified on step lifecycle transitions
///
/// # Example
///
/// ```
/// use maestro::engine::{EventBus, StepEvent};
/// use serde_json::json;
///
/// let bus = EventBus::new();
/// bus.subscribe(|event: &StepEvent| println!("{} {}", event.event_type, event.step_id));
/// bus.emit(StepEvent::started("validate", json!({})));
/// ```
#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<Arc<dyn StepObserver>>>,
}

impl EventBus {
    /// Create a bus with no observers
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observer
    pub fn subscribe(&self, observer: impl StepObserver + 'static) {
        self.subscribe_arc(Arc::new(observer));
    }

    /// Append a shared observer
    pub fn subscribe_arc(&self, observer: Arc<dyn StepObserver>) {
        self.observers.write().push(observer);
    }

    /// Subscribe a bounded channel and return its receiving end
    ///
    /// Delivery through the channel is asynchronous: events are queued with
    /// `try_send` and dropped (with a warning) when the receiver lags.
    pub fn subscribe_channel(&self, capacity: usize) -> mpsc::Receiver<StepEvent> {
        let (observer, rx) = ChannelObserver::new(capacity);
        self.subscribe(observer);
        rx
    }

    /// Notify every observer, in subscription order
    ///
    /// The observer list is copied under the read lock and invoked outside
    /// it, so an observer may subscribe further observers; those see the
    /// next event, not this one.
    pub fn emit(&self, event: StepEvent) {
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer.on_event(&event);
        }
    }

    /// Get the number of subscribed observers
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.observers.read().iter().map(|o| o.name()).collect();
        f.debug_struct("EventBus").field("observers", &names).finish()
    }
}

// ============================================================================
// Built-in observers
// ============================================================================

/// Observer that forwards events into a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<StepEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiver it feeds
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StepEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl StepObserver for ChannelObserver {
    fn on_event(&self, event: &StepEvent) {
        if let Err(err) = self.tx.try_send(event.clone()) {
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "channel full",
                mpsc::error::TrySendError::Closed(_) => "channel closed",
            };
            warn!(
                step_id = %event.step_id,
                event_type = %event.event_type,
                reason,
                "dropping step event"
            );
        }
    }

    fn name(&self) -> &'static str {
        "ChannelObserver"
    }
}

/// Observer that logs every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl StepObserver for TracingObserver {
    fn on_event(&self, event: &StepEvent) {
        match &event.payload {
            EventPayload::Error(error) => warn!(
                step_id = %event.step_id,
                error = %error,
                error_type = error.error_type.as_deref().unwrap_or("-"),
                "step failed"
            ),
            _ => info!(
                step_id = %event.step_id,
                event_type = %event.event_type,
                "step event"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "TracingObserver"
    }
}

// ============================================================================
// Tests
// ============================================================================
