//! Cancellation scopes passed to step procedures

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Reason a scope is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The scope (or one of its parents) was cancelled
    #[error("scope cancelled")]
    Cancelled,

    /// The scope deadline passed
    #[error("scope deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation scope handed to a step procedure
///
/// A scope carries a cancel signal and an optional deadline. Child scopes
/// inherit both: cancelling a parent cancels every child, and a child's
/// deadline is never later than its parent's. Cancellation is cooperative;
/// a step that never looks at its scope runs to completion.
///
/// # Example
///
/// ```ignore
/// async fn slow(scope: StepScope, _ctx: WorkflowContext) -> StepResult {
///     tokio::select! {
///         reason = scope.done() => Err(reason.into()),
///         body = fetch_report() => Ok(body?),
///     }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StepScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl StepScope {
    /// Create a root scope with no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child scope sharing this scope's deadline
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child scope that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child scope that expires at `deadline`
    ///
    /// The effective deadline is the earlier of `deadline` and the parent's.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this scope and all scopes derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if the scope was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The scope deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Why the scope is done, or `None` while it is still live
    pub fn error(&self) -> Option<ScopeError> {
        if self.token.is_cancelled() {
            return Some(ScopeError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ScopeError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Check if the scope is cancelled or past its deadline
    pub fn is_done(&self) -> bool {
        self.error().is_some()
    }

    /// Wait until the scope is cancelled or its deadline passes
    pub async fn done(&self) -> ScopeError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => ScopeError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ScopeError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ScopeError::Cancelled
            }
        }
    }

    /// Run a future until it finishes or the scope is done
    pub async fn run<F>(&self, future: F) -> Result<F::Output, ScopeError>
    where
        F: Future,
    {
        if let Some(err) = self.error() {
            return Err(err);
        }
        tokio::select! {
            reason = self.done() => Err(reason),
            output = future => Ok(output),
        }
    }

    /// Sleep for `duration` unless the scope ends first
    pub async fn sleep(&self, duration: Duration) -> Result<(), ScopeError> {
        self.run(tokio::time::sleep(duration)).await
    }

    /// Guard that cancels this scope when dropped
    pub(crate) fn release_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}
