//! Error types for the resilience layer.

use crate::errors::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for resilient invocations.
pub type InvocationResult<T> = Result<T, InvocationError>;

/// Classified failure of a single attempt against an external target.
///
/// Operations passed to the invoker fail with this type; the caller is
/// responsible for mapping transport and protocol errors onto the right
/// [`ErrorKind`] before the resilience layer sees them.
#[derive(Error, Debug, Clone)]
#[error("{kind} error: {message}")]
pub struct CallError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    retry_after: Option<Duration>,
}

impl CallError {
    /// Creates a call error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    /// Per-attempt deadline exceeded.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Transport-level failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Server-side failure with the status the target reported.
    pub fn service(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(ErrorKind::Service, message)
        }
    }

    /// Target signaled overload.
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Throttled, message)
    }

    /// Caller-side malformed request with the status the target reported.
    pub fn client(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(ErrorKind::Client, message)
        }
    }

    /// Caller aborted the attempt.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "attempt cancelled by caller")
    }

    /// Attaches a server-provided retry-after hint.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// The classified failure kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The status code reported by the target, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// The server-provided retry-after hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

/// Terminal outcome of [`ResilientInvoker::execute`].
///
/// Exactly one of these surfaces per invocation. Short-circuit rejections
/// (`CircuitOpen`, `RateLimited`) happen before any attempt and carry zero
/// attempts; `OperationFailed` carries the last attempt's error unchanged
/// together with how many attempts were made, so callers can tell "target is
/// down" from "target is overloaded" from "target failed after retries".
///
/// [`ResilientInvoker::execute`]: crate::resilience::ResilientInvoker::execute
#[derive(Error, Debug, Clone)]
pub enum InvocationError {
    /// Invalid configuration, including an unregistered target key.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The circuit breaker short-circuited the call before any attempt.
    #[error("circuit open for target '{target}'")]
    CircuitOpen {
        /// The protected target.
        target: String,
    },

    /// The rate limiter rejected the call before any attempt.
    #[error("rate limited for target '{target}', retry after {retry_after:?}")]
    RateLimited {
        /// The protected target.
        target: String,
        /// Time until enough tokens will be available, usable as a caller-side
        /// backoff hint.
        retry_after: Duration,
    },

    /// All attempts failed; the last attempt's error is attached unchanged.
    #[error("operation against '{target}' failed after {attempts} attempt(s)")]
    OperationFailed {
        /// The target the operation ran against.
        target: String,
        /// Number of attempts made, including the first.
        attempts: u32,
        /// The final attempt's classified error.
        #[source]
        source: CallError,
    },
}

impl InvocationError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        InvocationError::Configuration {
            message: message.into(),
        }
    }

    /// The classified kind of the final attempt, if any attempt was made.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            InvocationError::OperationFailed { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// Number of attempts made before this outcome. Zero for short-circuit
    /// rejections and configuration errors.
    pub fn attempts(&self) -> u32 {
        match self {
            InvocationError::OperationFailed { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// Backoff hint for the caller, if one is available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            InvocationError::RateLimited { retry_after, .. } => Some(*retry_after),
            InvocationError::OperationFailed { source, .. } => source.retry_after(),
            _ => None,
        }
    }
}
