//! Token bucket rate limiter.
//!
//! Admission happens before any network attempt: the bucket refills lazily
//! from elapsed time, and a rejected call learns how long until enough tokens
//! will have accumulated. The limiter never blocks; waiting is the caller's
//! decision.

use crate::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Configuration for the token bucket.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum burst size, in tokens. Must be greater than zero.
    pub capacity: u32,
    /// Sustained refill rate, in tokens per second. Must be greater than zero.
    pub refill_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_per_second: 50.0,
        }
    }
}

/// Returned when the bucket cannot admit a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRejection {
    /// Time until the rejected cost will be refillable.
    pub retry_after: Duration,
}

struct BucketState {
    /// Fractional tokens avoid refill quantization bias on frequent calls.
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by every caller targeting the same bucket key.
///
/// All mutation happens under a single mutex; the critical section is a few
/// float operations, so contention stays negligible next to network calls.
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Creates a rate limiter backed by the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Creates a rate limiter reading time from `clock`. The bucket starts
    /// full.
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Self {
        let state = BucketState {
            tokens: f64::from(config.capacity),
            last_refill: clock.now(),
        };
        Self {
            config,
            state: Mutex::new(state),
            clock,
        }
    }

    /// Tries to admit a call costing `cost` whole tokens (minimum 1).
    ///
    /// Ties are admitted: a bucket holding exactly `cost` tokens admits the
    /// call. On rejection the returned [`RateLimitRejection`] reports how long
    /// until `cost` tokens will have accumulated.
    pub fn try_acquire(&self, cost: u32) -> Result<(), RateLimitRejection> {
        let cost = f64::from(cost.max(1));
        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens >= cost {
            state.tokens -= cost;
            Ok(())
        } else {
            let needed = cost - state.tokens;
            Err(RateLimitRejection {
                retry_after: Duration::from_secs_f64(needed / self.config.refill_per_second),
            })
        }
    }

    /// Tokens currently available, including uncommitted refill.
    ///
    /// Side-effect free: nothing is consumed and the pending refill is not
    /// committed, so health checks never perturb admission.
    pub fn available(&self) -> f64 {
        let state = self.state.lock();
        let elapsed = self
            .clock
            .now()
            .duration_since(state.last_refill)
            .as_secs_f64();
        (state.tokens + elapsed * self.config.refill_per_second)
            .min(f64::from(self.config.capacity))
    }

    fn refill(&self, state: &mut BucketState) {
        let now = self.clock.now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.config.refill_per_second)
            .min(f64::from(self.config.capacity));
        state.last_refill = now;
    }
}
