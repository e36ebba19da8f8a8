//! Bounded exponential back-off around any fallible async call
//!
//! | Failure class | Action |
//! |---------------|--------|
//! | Transient | Retry after `base * 2^(attempt-1)`, capped at `max`, up to `max_attempts` total |
//! | Permanent | Return immediately as [`RetryError::Rejected`] |
//!
//! Running out of attempts yields [`RetryError::Exhausted`] with the last failure.

use crate::config::RetryConfig;
use crate::crawler::Clock;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// How a failure should be treated by [`RetryPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth another attempt (timeouts, 5xx, explicit back-off requests)
    Transient,

    /// Retrying cannot help; surface immediately
    Permanent,
}

/// Implemented by error types that can be retried
pub trait Classify {
    fn class(&self) -> ErrorClass;

    /// Minimum wait requested by the remote, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Terminal outcome of [`RetryPolicy::execute`]
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("{0}")]
    Rejected(E),
}

impl<E> RetryError<E> {
    /// The underlying failure
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Rejected(e) => e,
        }
    }
}

/// Exponential back-off retry decorator
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Back-off after the given failed attempt (1-based), before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }

    /// Wait before the next attempt
    ///
    /// Never above `max_delay` and never below `previous`, so jitter and
    /// `retry_after` hints cannot make the sequence shrink.
    fn next_delay(
        &self,
        attempt: u32,
        retry_after: Option<Duration>,
        previous: Duration,
    ) -> Duration {
        let mut delay = self.delay_for(attempt);
        if let Some(requested) = retry_after {
            delay = delay.max(requested);
        }
        if self.jitter {
            let ceiling = delay.as_millis() as u64 / 10;
            delay += Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling));
        }
        delay.min(self.max_delay).max(previous)
    }

    /// Runs `operation` until it succeeds, fails permanently or attempts run out
    ///
    /// The only suspension between attempts is `clock.sleep`.
    pub async fn execute<T, E, F, Fut, C>(
        &self,
        clock: &C,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        C: Clock + ?Sized,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let mut attempt = 0;
        let mut previous = Duration::ZERO;

        loop {
            attempt += 1;

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.class() == ErrorClass::Permanent {
                return Err(RetryError::Rejected(err));
            }

            if attempt >= self.max_attempts {
                tracing::error!("Max attempts ({}) reached: {}", self.max_attempts, err);
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.next_delay(attempt, err.retry_after(), previous);
            previous = delay;
            tracing::warn!(
                "Attempt {}/{} failed: {}. Retrying in {:.1}s...",
                attempt,
                self.max_attempts,
                err,
                delay.as_secs_f64()
            );
            clock.sleep(delay).await;
        }
    }
}
