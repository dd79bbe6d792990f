//! Retry utilities for resilient operations
//!
//! This module provides the retry loop with exponential backoff used by the
//! synchronization scheduler, plus the cancellation-aware waits every
//! suspension point goes through. Cancellation is a
//! `tokio::sync::watch::Receiver<bool>` that flips to `true` on shutdown.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub base_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    /// Delay slept before `attempt` (1-based). The first attempt runs immediately.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.max(1.0).powi((attempt - 2) as i32);
        self.base_delay.mul_f64(factor)
    }
}

/// Successful result of [`with_retry`]
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,

    /// Attempts made, including the successful one
    pub attempts: u32,

    /// Backoff sleeps taken, in order
    pub delays: Vec<Duration>,
}

/// Failure of [`with_retry`]
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error
    Exhausted { last: E, attempts: u32 },

    /// Shutdown observed before an attempt could succeed
    Cancelled { attempts: u32 },
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted { last, attempts } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            Self::Cancelled { attempts } => write!(f, "cancelled after {attempts} attempts"),
        }
    }
}

/// Execute an operation with retry logic and exponential backoff
///
/// The operation receives the 1-based attempt number. Attempts are strictly
/// sequential; shutdown aborts both an in-flight attempt and a pending sleep.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    shutdown: &mut watch::Receiver<bool>,
    mut operation: F,
) -> Result<Retried<T>, RetryError<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delays = Vec::new();
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = config.delay_before(attempt);
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying operation after delay"
            );
            if sleep_or_shutdown(delay, shutdown).await {
                return Err(RetryError::Cancelled {
                    attempts: attempt - 1,
                });
            }
            delays.push(delay);
        } else if is_shutdown(shutdown) {
            return Err(RetryError::Cancelled { attempts: 0 });
        }

        let outcome = tokio::select! {
            outcome = operation(attempt) => outcome,
            _ = wait_for_shutdown(shutdown) => {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(Retried {
                    value,
                    attempts: attempt,
                    delays,
                });
            }
            Err(e) => {
                warn!(attempt, max_attempts, error = %e, "Operation failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(last) => Err(RetryError::Exhausted {
            last,
            attempts: max_attempts,
        }),
        None => Err(RetryError::Cancelled { attempts: 0 }),
    }
}

/// Current value of the shutdown flag
pub fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Resolve once shutdown is signalled. Never resolves if the sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sleep for `duration` unless shutdown comes first. Returns `true` on shutdown.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if is_shutdown(shutdown) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = wait_for_shutdown(shutdown) => true,
    }
}
