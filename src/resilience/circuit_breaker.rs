//! Per-target circuit breaker.
//!
//! The breaker tracks consecutive counted failures against one logical target
//! and short-circuits calls while the target is deemed unhealthy. Windowing
//! strategy: the circuit opens on **consecutive** counted failures (the least
//! ambiguous option under bursty traffic); a bounded ring of recent outcomes
//! exists only to report a rolling error rate to health checks and never
//! drives transitions.
//!
//! Admission hands out an RAII [`CallPermit`]. The permit must be consumed
//! with the attempt's outcome; dropping it unconsumed (a cancelled attempt)
//! releases any half-open probe slot without touching the failure counter.

use crate::clock::{Clock, SystemClock};
use crate::errors::ErrorKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Target deemed unhealthy, calls are rejected immediately.
    Open,
    /// Cooldown elapsed; a bounded number of probe calls test recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("closed"),
            CircuitState::Open => f.write_str("open"),
            CircuitState::HalfOpen => f.write_str("half_open"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive counted failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing.
    pub cooldown: Duration,
    /// Maximum concurrent probe calls while half-open.
    pub half_open_max_probes: u32,
    /// Bound on the recent-outcome ring used for the rolling error rate.
    pub failure_window_size: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            half_open_max_probes: 1,
            failure_window_size: 50,
        }
    }
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    /// Set exactly while `state == Open`.
    opened_at: Option<Instant>,
    probes_in_flight: u32,
    /// Recent outcomes, `true` per failed attempt. Reporting only.
    window: VecDeque<bool>,
}

impl BreakerState {
    fn record_outcome(&mut self, failed: bool, cap: usize) {
        self.window.push_back(failed);
        while self.window.len() > cap.max(1) {
            self.window.pop_front();
        }
    }
}

/// Circuit breaker for one logical target.
///
/// All three reporting paths (success, failure, abandoned permit) and the
/// admission check mutate state under one mutex, so transitions are
/// linearizable. Which of several concurrent failures actually trips the
/// circuit is deliberately unspecified.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    clock: C,
}

impl CircuitBreaker<SystemClock> {
    /// Creates a circuit breaker backed by the system clock.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Creates a circuit breaker reading time from `clock`, starting closed.
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probes_in_flight: 0,
                window: VecDeque::new(),
            }),
            clock,
        }
    }

    /// Requests admission for one attempt.
    ///
    /// Returns `None` while the circuit is open and the cooldown has not
    /// elapsed, and while half-open with all probe slots taken. Otherwise
    /// returns a permit that must be resolved with [`CallPermit::success`] or
    /// [`CallPermit::failure`]; the first admission after the cooldown moves
    /// the circuit to half-open and reserves a probe slot inline (no
    /// background timer).
    pub fn try_acquire(&self) -> Option<CallPermit<'_, C>> {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::Closed => Some(CallPermit::regular(self)),
            CircuitState::Open => {
                let cooled_down = state
                    .opened_at
                    .map_or(true, |at| self.clock.now().duration_since(at) >= self.config.cooldown);
                if !cooled_down {
                    return None;
                }
                state.state = CircuitState::HalfOpen;
                state.opened_at = None;
                state.probes_in_flight = 1;
                info!(state = %CircuitState::HalfOpen, "circuit breaker probing after cooldown");
                Some(CallPermit::probe(self))
            }
            CircuitState::HalfOpen => {
                if state.probes_in_flight >= self.config.half_open_max_probes {
                    return None;
                }
                state.probes_in_flight += 1;
                Some(CallPermit::probe(self))
            }
        }
    }

    /// Current state. Pure read: an open circuit is not nudged toward
    /// half-open here, only in [`try_acquire`](Self::try_acquire).
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Current consecutive counted failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Fraction of failed attempts in the recent-outcome window, in `0.0..=1.0`.
    /// Returns `0.0` while the window is empty.
    pub fn rolling_error_rate(&self) -> f64 {
        let state = self.state.lock();
        if state.window.is_empty() {
            return 0.0;
        }
        let failures = state.window.iter().filter(|failed| **failed).count();
        failures as f64 / state.window.len() as f64
    }

    /// Time until an open circuit starts probing, `None` unless open.
    pub fn time_until_half_open(&self) -> Option<Duration> {
        let state = self.state.lock();
        match (state.state, state.opened_at) {
            (CircuitState::Open, Some(at)) => {
                let elapsed = self.clock.now().duration_since(at);
                Some(self.config.cooldown.saturating_sub(elapsed))
            }
            _ => None,
        }
    }

    fn on_success(&self, probe: bool) {
        let mut state = self.state.lock();
        if probe {
            state.probes_in_flight = state.probes_in_flight.saturating_sub(1);
        }
        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
                state.record_outcome(false, self.config.failure_window_size);
            }
            CircuitState::HalfOpen => {
                // First probe success closes the circuit and clears history.
                state.state = CircuitState::Closed;
                state.consecutive_failures = 0;
                state.opened_at = None;
                state.probes_in_flight = 0;
                state.window.clear();
                info!(state = %CircuitState::Closed, "circuit breaker closed after probe success");
            }
            CircuitState::Open => {
                // Stale report from a call admitted before the trip.
                state.record_outcome(false, self.config.failure_window_size);
            }
        }
    }

    fn on_failure(&self, kind: ErrorKind, probe: bool) {
        let mut state = self.state.lock();
        if probe {
            state.probes_in_flight = state.probes_in_flight.saturating_sub(1);
        }
        state.record_outcome(true, self.config.failure_window_size);

        if !kind.counts_against_breaker() {
            debug!(kind = %kind, "failure kind does not count against breaker");
            return;
        }

        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    state.state = CircuitState::Open;
                    state.opened_at = Some(self.clock.now());
                    state.probes_in_flight = 0;
                    warn!(
                        consecutive_failures = state.consecutive_failures,
                        state = %CircuitState::Open,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any probe failure reopens immediately with a fresh cooldown.
                state.state = CircuitState::Open;
                state.opened_at = Some(self.clock.now());
                state.probes_in_flight = 0;
                warn!(state = %CircuitState::Open, "circuit breaker reopened after probe failure");
            }
            CircuitState::Open => {}
        }
    }

    fn on_abandoned(&self, probe: bool) {
        if !probe {
            return;
        }
        let mut state = self.state.lock();
        state.probes_in_flight = state.probes_in_flight.saturating_sub(1);
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("consecutive_failures", &self.consecutive_failures())
            .finish_non_exhaustive()
    }
}

/// Admission token for one attempt through a [`CircuitBreaker`].
///
/// Must be resolved with the attempt's outcome. Dropping the permit without
/// resolving it means the attempt never completed (caller cancellation); the
/// breaker releases any probe slot and counts nothing.
#[must_use = "resolve the permit with success() or failure(), or drop it to abandon the attempt"]
pub struct CallPermit<'a, C: Clock = SystemClock> {
    breaker: &'a CircuitBreaker<C>,
    probe: bool,
    resolved: bool,
}

impl<'a, C: Clock> CallPermit<'a, C> {
    fn regular(breaker: &'a CircuitBreaker<C>) -> Self {
        Self {
            breaker,
            probe: false,
            resolved: false,
        }
    }

    fn probe(breaker: &'a CircuitBreaker<C>) -> Self {
        Self {
            breaker,
            probe: true,
            resolved: false,
        }
    }

    /// Whether this permit occupies a half-open probe slot.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Reports a successful attempt.
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.on_success(self.probe);
    }

    /// Reports a failed attempt of the given kind. Kinds that do not count
    /// against the breaker still release probe slots and enter the rolling
    /// error-rate window.
    pub fn failure(mut self, kind: ErrorKind) {
        self.resolved = true;
        self.breaker.on_failure(kind, self.probe);
    }
}

impl<C: Clock> Drop for CallPermit<'_, C> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.on_abandoned(self.probe);
        }
    }
}
