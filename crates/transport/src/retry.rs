//! Bounded retry with backoff for upstream calls.

use std::time::Duration;

use tracing::warn;

use crate::error::{Result, TransportError};

/// Delay schedule between attempts.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// No delay between attempts.
    None,
    /// Fixed delay between attempts.
    Fixed { delay: Duration },
    /// Exponential backoff capped at `max_delay`.
    Exponential {
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryStrategy {
    /// Delay before the attempt following attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::None => Duration::ZERO,
            RetryStrategy::Fixed { delay } => *delay,
            RetryStrategy::Exponential {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                let delay =
                    initial_delay.as_secs_f64() * multiplier.powi(attempt.saturating_sub(1) as i32);
                Duration::from_secs_f64(delay.min(max_delay.as_secs_f64()))
            }
        }
    }
}

/// Runs upstream operations with a bounded number of attempts.
///
/// Only transient failures are retried; a client error fails fast. When the
/// bound is spent the last error is surfaced as `RetriesExhausted` — never
/// swallowed, never replaced with a default.
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    strategy: RetryStrategy,
    max_attempts: u32,
}

impl Default for RetryingTransport {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            max_attempts: 3,
        }
    }
}

impl RetryingTransport {
    pub fn new(strategy: RetryStrategy, max_attempts: u32) -> Self {
        Self {
            strategy,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Execute `op`, retrying transient failures up to the attempt bound.
    pub fn execute<T>(&self, label: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last_error: Option<TransportError> = None;

        for attempt in 1..=self.max_attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "upstream attempt failed"
                    );
                    if attempt < self.max_attempts {
                        std::thread::sleep(self.strategy.delay_for_attempt(attempt));
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(TransportError::RetriesExhausted {
            attempts: self.max_attempts,
            last_error: last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }
}
