//! Per-operation cancellation and deadline.
//!
//! Every store call runs under its own `OperationContext`: a child of the
//! caller's cancellation token plus a deadline. Cancelling the parent (for
//! example on shutdown) cancels every in-flight operation derived from it.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an operation context finished before its work did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "context cancelled"),
            CancelReason::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Cancellation signal plus deadline for a single store operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    token: CancellationToken,
    deadline: Instant,
}

impl OperationContext {
    /// Derive a context from `parent` that also expires after `timeout`.
    pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            token: parent.child_token(),
            deadline: Instant::now() + timeout,
        }
    }

    /// A context with its own root token.
    pub fn new(timeout: Duration) -> Self {
        Self::with_timeout(&CancellationToken::new(), timeout)
    }

    /// Cancel this context (and nothing above it).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Reason the context has finished, if it has.
    pub fn finished(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            Some(CancelReason::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(CancelReason::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolve when the context is cancelled or its deadline passes.
    pub async fn done(&self) -> CancelReason {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => CancelReason::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => CancelReason::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_fires() {
        let ctx = OperationContext::new(Duration::from_millis(10));
        assert_eq!(ctx.finished(), None);
        assert_eq!(ctx.done().await, CancelReason::DeadlineExceeded);
        assert_eq!(ctx.finished(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let ctx = OperationContext::with_timeout(&parent, Duration::from_secs(60));

        parent.cancel();
        assert_eq!(ctx.done().await, CancelReason::Cancelled);
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_touch_parent() {
        let parent = CancellationToken::new();
        let ctx = OperationContext::with_timeout(&parent, Duration::from_secs(60));

        ctx.cancel();
        assert_eq!(ctx.finished(), Some(CancelReason::Cancelled));
        assert!(!parent.is_cancelled());
    }
}
