//! Configuration for the resilience layer.
//!
//! One [`ResilienceConfig`] bundles the retry, circuit breaker and rate
//! limiter settings for a target. Every field has a sensible default and the
//! whole tree deserializes from configuration files via `serde`, so callers
//! can specify only what they change.

use crate::errors::InvocationError;
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};
use serde::Deserialize;

/// Per-target resilience settings.
///
/// # Examples
///
/// ```
/// use integrations_resilience::config::ResilienceConfig;
/// use integrations_resilience::resilience::RetryConfig;
///
/// let config = ResilienceConfig {
///     retry: RetryConfig {
///         max_attempts: 5,
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retry and backoff settings.
    pub retry: RetryConfig,
    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Token bucket settings.
    pub rate_limit: RateLimitConfig,
}

impl ResilienceConfig {
    /// Checks every field for values that would make the components
    /// inoperable or nonsensical.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::Configuration`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), InvocationError> {
        if self.rate_limit.capacity == 0 {
            return Err(InvocationError::configuration(
                "rate_limit.capacity must be greater than zero",
            ));
        }
        if self.rate_limit.refill_per_second <= 0.0 {
            return Err(InvocationError::configuration(
                "rate_limit.refill_per_second must be greater than zero",
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(InvocationError::configuration(
                "circuit_breaker.failure_threshold must be greater than zero",
            ));
        }
        if self.circuit_breaker.half_open_max_probes == 0 {
            return Err(InvocationError::configuration(
                "circuit_breaker.half_open_max_probes must be greater than zero",
            ));
        }
        if self.circuit_breaker.failure_window_size == 0 {
            return Err(InvocationError::configuration(
                "circuit_breaker.failure_window_size must be greater than zero",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(InvocationError::configuration(
                "retry.max_attempts must be greater than zero",
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(InvocationError::configuration(
                "retry.multiplier must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_fraction) {
            return Err(InvocationError::configuration(
                "retry.jitter_fraction must be within 0.0..=1.0",
            ));
        }
        Ok(())
    }
}
