//! Resilience patterns for outbound calls.
//!
//! Three cooperating components protect each logical target:
//!
//! - [`RateLimiter`]: token bucket admission before any network attempt
//! - [`CircuitBreaker`]: short-circuits calls to unhealthy targets
//! - [`RetryPolicy`]: exponential backoff with partial jitter
//!
//! [`ResilientInvoker`] composes all three in a fixed order around an
//! [`Operation`] and is the intended entry point; the components are also
//! exported individually for callers that need just one of them.

mod circuit_breaker;
mod health;
mod invoker;
mod rate_limiter;
mod retry;

#[cfg(test)]
mod tests;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use health::{HealthMonitor, HealthReport};
pub use invoker::{Operation, ResilientInvoker, ResilientInvokerBuilder};
pub use rate_limiter::{RateLimitConfig, RateLimitRejection, RateLimiter};
pub use retry::{RetryConfig, RetryDecision, RetryPolicy};
