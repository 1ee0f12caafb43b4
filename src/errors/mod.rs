//! Error taxonomy for the resilience layer.
//!
//! Per-attempt failures are [`CallError`]s classified by [`ErrorKind`];
//! the single terminal outcome a caller sees is an [`InvocationError`].

mod error;
mod kinds;

pub use error::{CallError, InvocationError, InvocationResult};
pub use kinds::ErrorKind;
