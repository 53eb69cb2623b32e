//! Token-bucket admission control for mutating invocations.
//!
//! One bucket per limiter instance, refilled lazily from elapsed time on every
//! call. Time comes from `tokio::time::Instant` so paused-clock tests can
//! drive refill deterministically.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

const DEFAULT_REFILL_RATE: f64 = 100.0;
const DEFAULT_CAPACITY: f64 = 200.0;

/// Poll interval of [`RateLimiter::wait`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Number of polls before [`RateLimiter::wait`] gives up (10 seconds).
const WAIT_MAX_POLLS: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded: not admitted within {waited:?}")]
    Timeout { waited: Duration },
}

/// Snapshot returned by [`RateLimiter::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStats {
    pub enabled: bool,
    pub available_tokens: f64,
    pub capacity: f64,
    pub refill_rate: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    capacity: f64,
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Build from config. Non-positive rate or burst fall back to 100/s and 200.
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = if config.burst_size > 0 {
            config.burst_size as f64
        } else {
            DEFAULT_CAPACITY
        };
        let refill_rate = if config.requests_per_second > 0.0 {
            config.requests_per_second
        } else {
            DEFAULT_REFILL_RATE
        };

        Self {
            enabled: config.enabled,
            capacity,
            refill_rate,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// A limiter that admits everything.
    pub fn disabled() -> Self {
        Self::new(&RateLimitConfig {
            enabled: false,
            ..Default::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Take one token if available. Never blocks.
    pub fn allow(&self) -> bool {
        self.allow_n(1)
    }

    /// Take `n` tokens if all are available. Never blocks.
    pub fn allow_n(&self, n: u32) -> bool {
        self.allow_n_at(n, Instant::now())
    }

    pub(crate) fn allow_n_at(&self, n: u32, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, now);

        let needed = f64::from(n);
        if bucket.tokens >= needed {
            bucket.tokens -= needed;
            true
        } else {
            false
        }
    }

    /// Poll [`allow`](Self::allow) every 100 ms for up to 10 s.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::Timeout`] if no token became available in time.
    pub async fn wait(&self) -> Result<(), RateLimitError> {
        if !self.enabled {
            return Ok(());
        }

        for _ in 0..WAIT_MAX_POLLS {
            if self.allow() {
                return Ok(());
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }

        Err(RateLimitError::Timeout {
            waited: WAIT_POLL_INTERVAL * WAIT_MAX_POLLS,
        })
    }

    /// Current token count after a refill pass.
    pub fn stats(&self) -> RateLimiterStats {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());

        RateLimiterStats {
            enabled: self.enabled,
            available_tokens: bucket.tokens,
            capacity: self.capacity,
            refill_rate: self.refill_rate,
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
    }
}
