//! Quota tracking for the remote API
//!
//! The limiter only decides; it never sleeps. The coordinator asks
//! [`RateLimiter::should_pause`] before each fetch and performs the wait itself.

use crate::config::RateLimitConfig;
use crate::state::QuotaSnapshot;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Tracks the latest quota snapshot reported by the remote
#[derive(Debug, Clone)]
pub struct RateLimiter {
    low_water_mark: u32,
    reset_buffer: Duration,
    snapshot: Option<QuotaSnapshot>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            low_water_mark: config.low_water_mark,
            reset_buffer: Duration::from_millis(config.reset_buffer_ms),
            snapshot: None,
        }
    }

    /// Records a snapshot from a response
    ///
    /// A snapshot whose reset instant is earlier than the stored one is
    /// ignored, so a skewed or reordered response cannot roll the window back.
    /// An equal reset instant is the same window and replaces the stored value.
    pub fn observe(&mut self, snapshot: QuotaSnapshot) {
        match self.snapshot {
            Some(current) if snapshot.reset_at < current.reset_at => {
                tracing::debug!(
                    "Ignoring stale quota snapshot (reset {} < {})",
                    snapshot.reset_at,
                    current.reset_at
                );
            }
            _ => {
                if snapshot.remaining < self.low_water_mark {
                    tracing::info!(
                        "Rate limit status: {} requests remaining, resets at {}",
                        snapshot.remaining,
                        snapshot.reset_at
                    );
                }
                self.snapshot = Some(snapshot);
            }
        }
    }

    /// How long to wait before the next request; zero means go ahead
    ///
    /// Non-zero only while the remaining quota is below the low-water mark and
    /// the reset instant is still in the future.
    pub fn should_pause(&self, now: DateTime<Utc>) -> Duration {
        match self.snapshot {
            Some(snapshot) if snapshot.remaining < self.low_water_mark => {
                self.time_until_reset(snapshot.reset_at, now)
            }
            _ => Duration::ZERO,
        }
    }

    /// Wait until `reset_at` plus the configured buffer, or zero if it has passed
    pub fn time_until_reset(&self, reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        match (reset_at - now).to_std() {
            Ok(wait) if !wait.is_zero() => wait + self.reset_buffer,
            _ => Duration::ZERO,
        }
    }

    pub fn snapshot(&self) -> Option<QuotaSnapshot> {
        self.snapshot
    }
}
