//! Exponential backoff retry policy.
//!
//! The policy is a pure decision function: given the outcome of attempt *k*
//! it answers "retry after this delay" or "give up". It holds no per-call
//! state, so one instance is safely shared across concurrent invocations;
//! the attempt counter lives in the invoker's call frame.

use crate::errors::{CallError, ErrorKind};
use serde::Deserialize;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first. `1` means no retries ever.
    pub max_attempts: u32,
    /// Delay before the first retry, pre-jitter.
    pub base_delay: Duration,
    /// Upper bound on any computed delay.
    pub max_delay: Duration,
    /// Exponential growth factor between attempts.
    pub multiplier: f64,
    /// Fraction of each delay that is randomized, in `0.0..=1.0`.
    /// `0.0` gives fully deterministic backoff (useful in tests).
    pub jitter_fraction: f64,
    /// Failure kinds worth retrying. Kinds for which
    /// [`ErrorKind::is_terminal`] holds are never retried even if listed.
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_fraction: 0.2,
            retryable_kinds: vec![
                ErrorKind::Timeout,
                ErrorKind::Connection,
                ErrorKind::Service,
                ErrorKind::Throttled,
            ],
        }
    }
}

/// Decision for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-attempt after sleeping for the given delay.
    RetryAfter(Duration),
    /// Stop and surface the last error to the caller.
    GiveUp,
}

/// Stateless backoff scheduler.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a policy from configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The configuration this policy was built with.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Decides what to do after attempt `attempt` (1-based) failed with
    /// `error`.
    ///
    /// Gives up when the attempt budget is exhausted, when the kind is not in
    /// the retryable set, and always for terminal kinds (`Client`,
    /// `Cancelled`), regardless of configuration. A server-provided
    /// retry-after hint on the error replaces the computed delay when it asks
    /// for more patience.
    pub fn decide(&self, attempt: u32, error: &CallError) -> RetryDecision {
        let kind = error.kind();
        if kind.is_terminal()
            || attempt >= self.config.max_attempts
            || !self.config.retryable_kinds.contains(&kind)
        {
            return RetryDecision::GiveUp;
        }

        let mut delay = self.backoff_delay(attempt);
        if let Some(server_hint) = error.retry_after() {
            if server_hint > delay {
                delay = server_hint;
            }
        }
        RetryDecision::RetryAfter(delay)
    }

    /// Delay after attempt `attempt`: `min(max_delay, base * multiplier^(k-1))`
    /// with partial jitter, `uniform(0, d*j) + d*(1-j)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let capped = (self.config.base_delay.as_secs_f64() * self.config.multiplier.powi(exponent))
            .min(self.config.max_delay.as_secs_f64());

        let jitter = self.config.jitter_fraction.clamp(0.0, 1.0);
        let spread = if jitter > 0.0 {
            rand::random::<f64>() * capped * jitter
        } else {
            0.0
        };
        Duration::from_secs_f64(capped * (1.0 - jitter) + spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_fraction: 0.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_deterministic_backoff_sequence() {
        let policy = deterministic(3);
        let error = CallError::service(503, "unavailable");

        assert_eq!(
            policy.decide(1, &error),
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(
            policy.decide(2, &error),
            RetryDecision::RetryAfter(Duration::from_millis(200))
        );
        assert_eq!(policy.decide(3, &error), RetryDecision::GiveUp);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = deterministic(50);
        let error = CallError::connection("reset");

        match policy.decide(30, &error) {
            RetryDecision::RetryAfter(delay) => assert_eq!(delay, Duration::from_secs(10)),
            RetryDecision::GiveUp => panic!("attempt 30 of 50 should retry"),
        }
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = deterministic(1);
        let error = CallError::timeout("deadline exceeded");
        assert_eq!(policy.decide(1, &error), RetryDecision::GiveUp);
    }

    #[test]
    fn test_non_retryable_kind_gives_up() {
        let policy = deterministic(5);
        let error = CallError::client(400, "bad request");
        assert_eq!(policy.decide(1, &error), RetryDecision::GiveUp);
    }

    #[test]
    fn test_terminal_kinds_ignore_configuration() {
        // Even a misconfigured retryable set never replays these.
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 5,
            retryable_kinds: vec![ErrorKind::Client, ErrorKind::Cancelled],
            jitter_fraction: 0.0,
            ..Default::default()
        });

        assert_eq!(
            policy.decide(1, &CallError::client(422, "unprocessable")),
            RetryDecision::GiveUp
        );
        assert_eq!(
            policy.decide(1, &CallError::cancelled()),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_fraction: 0.5,
            ..Default::default()
        });
        let error = CallError::service(500, "boom");

        for _ in 0..100 {
            match policy.decide(1, &error) {
                RetryDecision::RetryAfter(delay) => {
                    // Partial jitter over 1000ms at 0.5: 500ms..=1000ms.
                    assert!(delay >= Duration::from_millis(500), "delay {delay:?} too low");
                    assert!(delay <= Duration::from_millis(1000), "delay {delay:?} too high");
                }
                RetryDecision::GiveUp => panic!("first of two attempts should retry"),
            }
        }
    }

    #[test]
    fn test_server_retry_after_wins_when_longer() {
        let policy = deterministic(3);
        let error =
            CallError::throttled("busy").with_retry_after(Duration::from_secs(5));

        assert_eq!(
            policy.decide(1, &error),
            RetryDecision::RetryAfter(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_server_retry_after_ignored_when_shorter() {
        let policy = deterministic(3);
        let error =
            CallError::throttled("busy").with_retry_after(Duration::from_millis(10));

        assert_eq!(
            policy.decide(1, &error),
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
    }
}
