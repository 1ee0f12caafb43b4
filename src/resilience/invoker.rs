//! Composition root wiring the resilience policies around an operation.
//!
//! Per attempt the order is fixed: rate limit, then circuit breaker, then the
//! timeout-bounded call, then outcome classification feeding the breaker and
//! the retry policy. The rate limiter runs first because it is the cheapest,
//! most load-shedding-relevant gate; the breaker runs before the call so a
//! known-broken target is never hit at all. Limiter and breaker rejections
//! are terminal without consulting the retry policy: retrying into a target
//! the stack just chose to protect would defeat the point.

use crate::clock::{Clock, SystemClock};
use crate::config::ResilienceConfig;
use crate::errors::{CallError, ErrorKind, InvocationError, InvocationResult};
use crate::observability::{metric_names, MetricsCollector, NoopMetricsCollector};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::health::HealthMonitor;
use crate::resilience::rate_limiter::RateLimiter;
use crate::resilience::retry::{RetryDecision, RetryPolicy};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// A unit of work against an external target.
///
/// The factory is invoked once per attempt, so it may run multiple times
/// under retries; the caller is responsible for idempotency. Each attempt is
/// bounded by the declared timeout and cancelled when it elapses.
pub struct Operation<F> {
    name: String,
    timeout: Duration,
    factory: F,
}

impl<F> Operation<F> {
    /// Creates an operation with the default per-attempt timeout.
    pub fn new(name: impl Into<String>, factory: F) -> Self {
        Self {
            name: name.into(),
            timeout: Duration::from_secs(crate::DEFAULT_ATTEMPT_TIMEOUT_SECS),
            factory,
        }
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Identifier used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) struct TargetHandles<C: Clock> {
    pub(crate) breaker: CircuitBreaker<C>,
    pub(crate) limiter: RateLimiter<C>,
    pub(crate) retry: RetryPolicy,
}

impl<C: Clock> TargetHandles<C> {
    fn new(config: &ResilienceConfig, clock: C) -> Self
    where
        C: Clone,
    {
        Self {
            breaker: CircuitBreaker::with_clock(config.circuit_breaker.clone(), clock.clone()),
            limiter: RateLimiter::with_clock(config.rate_limit.clone(), clock),
            retry: RetryPolicy::new(config.retry.clone()),
        }
    }
}

/// Applies rate limiting, circuit breaking and retry around operations
/// against a fixed set of targets.
///
/// The target registry is built once at construction and never resized;
/// breaker and bucket state for each target live for the process lifetime.
/// The invoker itself holds no per-call state, so one instance is shared
/// across arbitrarily many concurrent callers.
pub struct ResilientInvoker<C: Clock = SystemClock> {
    targets: Arc<HashMap<String, TargetHandles<C>>>,
    metrics: Arc<dyn MetricsCollector>,
    clock: C,
}

impl ResilientInvoker<SystemClock> {
    /// Creates a builder with default configuration and the system clock.
    pub fn builder() -> ResilientInvokerBuilder<SystemClock> {
        ResilientInvokerBuilder::new()
    }
}

impl<C: Clock> ResilientInvoker<C> {
    /// Executes `operation` against `target` under the full resilience stack.
    ///
    /// Returns the operation's response, or exactly one terminal
    /// [`InvocationError`]: a short-circuit rejection (circuit open, rate
    /// limited), or the last attempt's error once retries are exhausted.
    /// Dropping the returned future cancels the in-flight attempt without
    /// counting a breaker failure or consuming a probe slot.
    pub async fn execute<F, Fut, T>(&self, target: &str, operation: Operation<F>) -> InvocationResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let handles = self.targets.get(target).ok_or_else(|| {
            InvocationError::configuration(format!(
                "unknown target '{target}'; targets are registered at construction"
            ))
        })?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            if let Err(rejection) = handles.limiter.try_acquire(1) {
                self.metrics.increment_counter(
                    metric_names::REJECTED,
                    1,
                    &[("target", target), ("reason", "rate_limited")],
                );
                warn!(
                    target,
                    operation = operation.name(),
                    attempt,
                    retry_after_ms = rejection.retry_after.as_millis() as u64,
                    "rate limiter rejected call"
                );
                return Err(InvocationError::RateLimited {
                    target: target.to_string(),
                    retry_after: rejection.retry_after,
                });
            }

            let Some(permit) = handles.breaker.try_acquire() else {
                self.metrics.increment_counter(
                    metric_names::REJECTED,
                    1,
                    &[("target", target), ("reason", "circuit_open")],
                );
                warn!(
                    target,
                    operation = operation.name(),
                    attempt,
                    "circuit breaker rejected call"
                );
                return Err(InvocationError::CircuitOpen {
                    target: target.to_string(),
                });
            };

            let started = self.clock.now();
            let result = match timeout(operation.timeout, (operation.factory)()).await {
                Ok(result) => result,
                Err(_) => Err(CallError::timeout(format!(
                    "attempt exceeded {:?} deadline",
                    operation.timeout
                ))),
            };
            let latency = self.clock.now().duration_since(started);

            match result {
                Ok(response) => {
                    permit.success();
                    self.record_attempt(target, &operation, attempt, latency, "success");
                    return Ok(response);
                }
                Err(error) => {
                    let kind = error.kind();
                    if kind == ErrorKind::Cancelled {
                        // Caller-side abort: release the permit without
                        // feeding the breaker or the error-rate window.
                        drop(permit);
                    } else {
                        permit.failure(kind);
                    }
                    self.record_attempt(target, &operation, attempt, latency, kind.as_str());

                    match handles.retry.decide(attempt, &error) {
                        RetryDecision::RetryAfter(delay) => {
                            self.metrics.increment_counter(
                                metric_names::RETRIES,
                                1,
                                &[("target", target)],
                            );
                            debug!(
                                target,
                                operation = operation.name(),
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "retrying after backoff"
                            );
                            sleep(delay).await;
                        }
                        RetryDecision::GiveUp => {
                            warn!(
                                target,
                                operation = operation.name(),
                                attempts = attempt,
                                kind = %kind,
                                "operation failed, giving up"
                            );
                            return Err(InvocationError::OperationFailed {
                                target: target.to_string(),
                                attempts: attempt,
                                source: error,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Read-only health reporting over this invoker's targets.
    pub fn health(&self) -> HealthMonitor<C> {
        HealthMonitor::new(Arc::clone(&self.targets))
    }

    /// Registered target keys, in arbitrary order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    fn record_attempt<F>(
        &self,
        target: &str,
        operation: &Operation<F>,
        attempt: u32,
        latency: Duration,
        outcome: &str,
    ) {
        let latency_ms = latency.as_secs_f64() * 1000.0;
        debug!(
            target,
            operation = operation.name(),
            attempt,
            latency_ms,
            outcome,
            "attempt finished"
        );
        self.metrics.increment_counter(
            metric_names::ATTEMPTS,
            1,
            &[("target", target), ("outcome", outcome)],
        );
        self.metrics.record_histogram(
            metric_names::ATTEMPT_LATENCY_MS,
            latency_ms,
            &[("target", target)],
        );
    }
}

/// Builder for [`ResilientInvoker`].
///
/// Targets are declared up front; each gets its own breaker and token bucket
/// built from its configuration (or the builder's defaults).
pub struct ResilientInvokerBuilder<C: Clock + Clone = SystemClock> {
    defaults: ResilienceConfig,
    targets: Vec<(String, Option<ResilienceConfig>)>,
    metrics: Arc<dyn MetricsCollector>,
    clock: C,
}

impl ResilientInvokerBuilder<SystemClock> {
    /// Creates a builder with default configuration and the system clock.
    pub fn new() -> Self {
        Self {
            defaults: ResilienceConfig::default(),
            targets: Vec::new(),
            metrics: Arc::new(NoopMetricsCollector),
            clock: SystemClock,
        }
    }
}

impl Default for ResilientInvokerBuilder<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone> ResilientInvokerBuilder<C> {
    /// Sets the configuration applied to targets registered without one.
    pub fn defaults(mut self, config: ResilienceConfig) -> Self {
        self.defaults = config;
        self
    }

    /// Registers a target using the builder's default configuration.
    pub fn target(mut self, key: impl Into<String>) -> Self {
        self.targets.push((key.into(), None));
        self
    }

    /// Registers a target with its own configuration.
    pub fn target_with_config(mut self, key: impl Into<String>, config: ResilienceConfig) -> Self {
        self.targets.push((key.into(), Some(config)));
        self
    }

    /// Sets the metrics sink. Defaults to a no-op collector.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replaces the time source, rebinding the builder's clock type.
    pub fn clock<C2: Clock + Clone>(self, clock: C2) -> ResilientInvokerBuilder<C2> {
        ResilientInvokerBuilder {
            defaults: self.defaults,
            targets: self.targets,
            metrics: self.metrics,
            clock,
        }
    }

    /// Validates every configuration and builds the invoker.
    pub fn build(self) -> Result<ResilientInvoker<C>, InvocationError> {
        let mut targets = HashMap::with_capacity(self.targets.len());
        for (key, config) in self.targets {
            let config = config.as_ref().unwrap_or(&self.defaults);
            config.validate().map_err(|err| {
                InvocationError::configuration(format!("target '{key}': {err}"))
            })?;
            targets.insert(key, TargetHandles::new(config, self.clock.clone()));
        }

        Ok(ResilientInvoker {
            targets: Arc::new(targets),
            metrics: self.metrics,
            clock: self.clock,
        })
    }
}
