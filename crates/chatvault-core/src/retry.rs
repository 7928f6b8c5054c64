//! Bounded exponential-backoff retry for store operations.
//!
//! Errors are classified by message: a fixed list of substrings marks an
//! error as transient (network blips, timeouts, pool exhaustion, lock
//! contention). Everything else is permanent and returned on first sight.
//! Backoff waits race the operation's `OperationContext`, so cancellation is
//! observed within one backoff interval.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chatvault_types::config::RetryConfig;
use thiserror::Error;
use tracing::warn;

use crate::context::{CancelReason, OperationContext};

/// Substrings that mark an error message as transient.
const TRANSIENT_PATTERNS: &[&str] = &[
    // Network
    "connection refused",
    "connection reset",
    "timeout",
    "timed out",
    "temporary failure",
    "i/o timeout",
    "EOF",
    // Store / driver
    "server selection timeout",
    "no reachable servers",
    "connection pool",
    "socket",
    "database is locked",
    "database table is locked",
];

/// Whether an error message describes a failure worth retrying.
pub fn is_transient(message: &str) -> bool {
    TRANSIENT_PATTERNS.iter().any(|p| message.contains(p))
}

/// Outcome of a retried operation that did not succeed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed with a non-retryable error.
    #[error("{0}")]
    Permanent(E),

    /// Every attempt failed with a transient error.
    #[error("operation failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// The context finished while attempting or waiting to retry.
    #[error("{operation} cancelled during retry after {attempts} attempt(s): {reason}")]
    Cancelled {
        operation: String,
        attempts: u32,
        reason: CancelReason,
    },
}

/// Runs fallible async operations with classification-aware backoff.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Attempt ceiling; never below one.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay to wait after `delay`, multiplied and capped.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let multiplier = if self.config.multiplier.is_finite() && self.config.multiplier >= 1.0 {
            self.config.multiplier
        } else {
            1.0
        };
        delay.mul_f64(multiplier).min(self.config.max_delay())
    }

    /// Run `attempt` until it succeeds, fails permanently, runs out of
    /// attempts, or `ctx` finishes. Errors are classified by their message.
    pub async fn run<T, E, F, Fut>(
        &self,
        ctx: &OperationContext,
        operation: &str,
        attempt: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.run_classified(ctx, operation, |err: &E| is_transient(&err.to_string()), attempt)
            .await
    }

    /// Like [`run`](Self::run), with a caller-supplied transient check.
    pub async fn run_classified<T, E, C, F, Fut>(
        &self,
        ctx: &OperationContext,
        operation: &str,
        classify: C,
        mut attempt: F,
    ) -> Result<T, RetryError<E>>
    where
        C: Fn(&E) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.max_attempts();
        let mut delay = self.config.initial_delay().min(self.config.max_delay());
        let mut attempts = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                reason = ctx.done() => {
                    return Err(RetryError::Cancelled {
                        operation: operation.to_string(),
                        attempts,
                        reason,
                    });
                }
                outcome = attempt() => outcome,
            };
            attempts += 1;

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !classify(&err) {
                return Err(RetryError::Permanent(err));
            }

            if attempts >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts,
                    last_error: err,
                });
            }

            warn!(
                operation,
                attempt = attempts,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "store operation failed, retrying"
            );

            tokio::select! {
                biased;
                reason = ctx.done() => {
                    return Err(RetryError::Cancelled {
                        operation: operation.to_string(),
                        attempts,
                        reason,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }

            delay = self.next_delay(delay);
        }
    }
}
