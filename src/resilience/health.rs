//! Read-only health reporting over an invoker's targets.

use crate::clock::Clock;
use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::invoker::TargetHandles;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Point-in-time health of one target.
///
/// Produced by [`HealthMonitor::snapshot`]; safe to poll at any frequency
/// because taking a snapshot consumes no tokens and triggers no breaker
/// transition.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Target key as registered at construction.
    pub target: String,
    /// Circuit breaker state at snapshot time.
    pub state: CircuitState,
    /// Consecutive counted failures toward the trip threshold.
    pub consecutive_failures: u32,
    /// Rate limiter tokens available, including uncommitted refill.
    pub tokens_available: f64,
    /// Fraction of failed attempts in the breaker's recent-outcome window.
    pub rolling_error_rate: f64,
}

/// Handle for inspecting target health without being able to mutate it.
pub struct HealthMonitor<C: Clock> {
    targets: Arc<HashMap<String, TargetHandles<C>>>,
}

impl<C: Clock> HealthMonitor<C> {
    pub(crate) fn new(targets: Arc<HashMap<String, TargetHandles<C>>>) -> Self {
        Self { targets }
    }

    /// Health of a single target, or `None` if the key is not registered.
    pub fn snapshot(&self, target: &str) -> Option<HealthReport> {
        self.targets
            .get(target)
            .map(|handles| Self::report(target, handles))
    }

    /// Health of every registered target, sorted by key for stable output.
    pub fn snapshot_all(&self) -> Vec<HealthReport> {
        let mut reports: Vec<_> = self
            .targets
            .iter()
            .map(|(target, handles)| Self::report(target, handles))
            .collect();
        reports.sort_by(|a, b| a.target.cmp(&b.target));
        reports
    }

    fn report(target: &str, handles: &TargetHandles<C>) -> HealthReport {
        HealthReport {
            target: target.to_string(),
            state: handles.breaker.state(),
            consecutive_failures: handles.breaker.consecutive_failures(),
            tokens_available: handles.limiter.available(),
            rolling_error_rate: handles.breaker.rolling_error_rate(),
        }
    }
}

impl<C: Clock> Clone for HealthMonitor<C> {
    fn clone(&self) -> Self {
        Self {
            targets: Arc::clone(&self.targets),
        }
    }
}
