//! The recovery boundary.
//!
//! [`attempt`] and [`attempt_side_effect`] are the only places in the crate
//! where a panic from the raw layer is caught. Every wrapper method funnels
//! its raw call through one of them, and `jsguard` checks that application
//! code does the same.
//!
//! ```rust
//! use safejs::catch;
//! use safejs::raw;
//!
//! let err = catch::attempt(|| raw::undefined().get("foo")).unwrap_err();
//! assert_eq!(err.to_string(), "call of Value.get on undefined");
//! ```
//!
//! Side effects performed by the operation before it panicked stay in
//! effect; nothing is rolled back or retried.

mod classify;
mod hook;

pub use classify::classify;
pub use hook::in_recovery_scope;

use crate::error::{Error, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Runs `op`, converting any panic it raises into an [`Error`].
///
/// Exactly one of two things happens: `op` returns normally and its value
/// comes back as `Ok`, or `op` panics and the classified payload comes back
/// as `Err`. The panic never propagates past this call.
pub fn attempt<R>(op: impl FnOnce() -> R) -> Result<R> {
    match recover(op) {
        Ok(result) => Ok(result),
        Err(payload) => Err(recovered(payload).unwrap_or_else(|| {
            Error::Panic("recovered a panic that carried no payload".to_string())
        })),
    }
}

/// Like [`attempt`], for operations that return nothing.
///
/// A panic that carries no payload (`panic_any(())`) is not treated as a
/// failure.
pub fn attempt_side_effect(op: impl FnOnce()) -> Result<()> {
    match recover(op) {
        Ok(()) => Ok(()),
        Err(payload) => recovered(payload).map_or(Ok(()), Err),
    }
}

fn recover<R>(op: impl FnOnce() -> R) -> std::result::Result<R, Box<dyn Any + Send>> {
    let _scope = hook::RecoveryScope::enter();
    panic::catch_unwind(AssertUnwindSafe(op))
}

fn recovered(payload: Box<dyn Any + Send>) -> Option<Error> {
    let trace = hook::take_backtrace();
    let error = classify(Some(payload))?;
    tracing::debug!(kind = ?error.kind(), "converted panic into error");
    Some(error.with_backtrace(trace))
}
