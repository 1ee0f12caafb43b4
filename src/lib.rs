//! # Resilience Layer for Outbound Integrations
//!
//! Production-ready resilience primitives for calls to external services.
//!
//! ## Features
//!
//! - Token bucket rate limiting with retry-after hints
//! - Circuit breaking with half-open probing and per-target isolation
//! - Exponential backoff retries with partial jitter
//! - A single invoker composing all three in a fixed, predictable order
//! - Read-only health snapshots per target
//! - Observability via `tracing` events and pluggable metrics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_resilience::{CallError, Operation, ResilientInvoker};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let invoker = ResilientInvoker::builder()
//!         .target("payments")
//!         .build()?;
//!
//!     let operation = Operation::new("charge", || async {
//!         // Call the external service here and map its failures
//!         // onto CallError kinds.
//!         Ok::<_, CallError>("charged")
//!     })
//!     .with_timeout(Duration::from_secs(5));
//!
//!     let receipt = invoker.execute("payments", operation).await?;
//!     println!("{receipt}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - `resilience` - Invoker, circuit breaker, rate limiter, retry, health
//! - `config` - Per-target configuration and validation
//! - `errors` - Error taxonomy and terminal outcomes
//! - `clock` - Time source abstraction for deterministic tests
//! - `observability` - Structured logging setup and metrics collection

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod clock;
pub mod config;
pub mod errors;
pub mod observability;
pub mod resilience;

// Re-export main types for convenience
pub use clock::{Clock, SystemClock};
pub use config::ResilienceConfig;
pub use errors::{CallError, ErrorKind, InvocationError, InvocationResult};
pub use resilience::{
    CircuitBreakerConfig, CircuitState, HealthMonitor, HealthReport, Operation, RateLimitConfig,
    ResilientInvoker, ResilientInvokerBuilder, RetryConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default per-attempt timeout in seconds
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;

/// Default total attempts per invocation, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
