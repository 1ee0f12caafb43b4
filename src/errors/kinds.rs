//! Failure classification for attempts against external targets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified kind of a failed attempt.
///
/// The kind drives two independent decisions in the invoker: whether the
/// circuit breaker's failure counter moves ([`counts_against_breaker`]) and
/// whether the retry policy may attempt again. The two sets differ on
/// purpose: a throttled response means the target is alive but busy, so it is
/// worth retrying with backoff yet says nothing about target health.
///
/// [`counts_against_breaker`]: ErrorKind::counts_against_breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The per-attempt deadline was exceeded.
    Timeout,
    /// Transport-level failure: connection refused, reset, DNS.
    Connection,
    /// The target responded but signaled a server-side failure (5xx-equivalent).
    Service,
    /// The target signaled overload (429-equivalent).
    Throttled,
    /// Caller-side malformed request (4xx-equivalent).
    Client,
    /// The caller aborted the attempt.
    Cancelled,
}

impl ErrorKind {
    /// Whether failures of this kind are retried when no explicit retryable
    /// set is configured.
    pub fn is_retryable_by_default(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Connection | ErrorKind::Service | ErrorKind::Throttled
        )
    }

    /// Whether failures of this kind reflect target health and move the
    /// circuit breaker's failure counter.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Connection | ErrorKind::Service
        )
    }

    /// Whether this kind is terminal no matter how retries are configured.
    ///
    /// Client errors will fail identically on every attempt, and a
    /// cancellation is a caller-side abort, so neither is ever replayed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ErrorKind::Client | ErrorKind::Cancelled)
    }

    /// Stable lowercase name, used for log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::Service => "service",
            ErrorKind::Throttled => "throttled",
            ErrorKind::Client => "client",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
