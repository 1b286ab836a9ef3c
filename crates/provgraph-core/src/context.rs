//! # Execution Context
//!
//! Deadline and cancellation for one query. The executor polls
//! [`ExecutionContext::check`] while scanning and at every frontier pop;
//! a tripped check aborts the query with no partial result.

use crate::types::{ExecutionFault, ProvGraphError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared flag for cancelling a running query from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Limits that apply while a query runs.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl ExecutionContext {
    /// No deadline, not cancellable from outside.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fail if the query was cancelled or ran past its deadline.
    pub fn check(&self) -> Result<(), ProvGraphError> {
        if self.cancel.is_cancelled() {
            return Err(ExecutionFault::Cancelled.into());
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ExecutionFault::Timeout.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_passes() {
        assert!(ExecutionContext::new().check().is_ok());
    }

    #[test]
    fn cancelled_token_trips() {
        let token = CancelToken::new();
        let ctx = ExecutionContext::new().with_cancel(token.clone());
        token.cancel();
        assert_eq!(
            ctx.check(),
            Err(ProvGraphError::Execution(ExecutionFault::Cancelled))
        );
    }

    #[test]
    fn past_deadline_trips() {
        let ctx = ExecutionContext::new().with_deadline(Instant::now());
        assert_eq!(
            ctx.check(),
            Err(ProvGraphError::Execution(ExecutionFault::Timeout))
        );
    }

    #[test]
    fn cancel_wins_over_deadline() {
        let ctx = ExecutionContext::with_timeout(Duration::from_secs(60));
        ctx.cancel_token().cancel();
        assert!(matches!(
            ctx.check(),
            Err(ProvGraphError::Execution(ExecutionFault::Cancelled))
        ));
    }
}
