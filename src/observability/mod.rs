//! Observability module providing metrics and logging capabilities.
//!
//! This module provides observability features for monitoring and debugging
//! the resilience layer:
//!
//! - **Metrics**: attempt, retry and rejection metrics (counters, histograms, gauges)
//! - **Logging**: Structured logging with multiple formats
//!
//! ## Examples
//!
//! ```rust,no_run
//! use integrations_resilience::observability::{
//!     InMemoryMetricsCollector, MetricsCollector,
//!     LoggingConfig, LogLevel, LogFormat
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Initialize logging
//! LoggingConfig::new()
//!     .with_level(LogLevel::Info)
//!     .with_format(LogFormat::Pretty)
//!     .init()?;
//!
//! // Create metrics collector
//! let metrics = InMemoryMetricsCollector::new();
//! metrics.increment_counter("attempts", 1, &[("target", "payments")]);
//! # Ok(())
//! # }
//! ```

mod logging;
mod metrics;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metrics::{
    metric_names, InMemoryMetricsCollector, MetricsCollector, NoopMetricsCollector,
};
