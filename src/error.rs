//! Error types surfaced by the wrapper layer.
//!
//! Every failed host call comes back as an [`Error`], whatever the raw
//! layer panicked with:
//!
//! - a typed error (`raw::ValueError`, a re-raised [`Error`], any boxed
//!   `std::error::Error`) is passed through untouched;
//! - a host exception becomes a [`HostError`], whose message is read from
//!   the host lazily;
//! - anything else becomes [`Error::Panic`] holding a best-effort rendering
//!   of the payload.
//!
//! Errors produced by [`crate::catch`] additionally carry the backtrace of
//! the original panic. The annotation never changes what `Display` prints.

use crate::catch;
use crate::raw;
use crate::Value;
use once_cell::sync::OnceCell;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

/// Prefix of messages rendered when a host error cannot describe itself.
pub const MESSAGE_FAILURE_PREFIX: &str = "failed generating error message: ";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// An exception thrown by the host.
    #[error(transparent)]
    Host(#[from] HostError),

    /// A raw operation was applied to a value of the wrong type.
    #[error(transparent)]
    Value(#[from] raw::ValueError),

    /// A panic whose payload was not an error.
    #[error("{0}")]
    Panic(String),

    /// `instance_of` was handed something that is not a function.
    #[error("invalid type for instanceof: {0}")]
    InstanceOfType(raw::Type),

    /// `instance_of` was handed a function without an object `prototype`.
    #[error("invalid constructor type for instanceof: {0}")]
    InstanceOfConstructor(String),

    /// A typed error from outside this crate, passed through a panic.
    #[error(transparent)]
    Other(Arc<dyn std::error::Error + Send + Sync>),

    /// An error recovered by [`catch::attempt`], with the backtrace of the
    /// panic that raised it.
    #[error("{error}")]
    Recovered { error: Box<Error>, trace: Arc<Backtrace> },
}

/// Coarse classification of an [`Error`], ignoring backtrace annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Host,
    Value,
    Panic,
    InstanceOf,
    Other,
}

impl Error {
    /// Wraps any typed error so it can travel through a panic and come back
    /// out of [`catch::attempt`] unchanged.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Other(Arc::new(err))
    }

    /// Attaches a panic backtrace. Errors that already carry one keep it.
    pub fn with_backtrace(self, trace: Backtrace) -> Self {
        match self {
            recovered @ Error::Recovered { .. } => recovered,
            error => Error::Recovered {
                error: Box::new(error),
                trace: Arc::new(trace),
            },
        }
    }

    /// The error without its backtrace annotation.
    pub fn root(&self) -> &Error {
        match self {
            Error::Recovered { error, .. } => error.root(),
            error => error,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Error::Host(_) => ErrorKind::Host,
            Error::Value(_) => ErrorKind::Value,
            Error::Panic(_) => ErrorKind::Panic,
            Error::InstanceOfType(_) | Error::InstanceOfConstructor(_) => ErrorKind::InstanceOf,
            Error::Other(_) | Error::Recovered { .. } => ErrorKind::Other,
        }
    }

    /// Backtrace of the panic this error was recovered from, if any.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            Error::Recovered { trace, .. } => Some(trace),
            _ => None,
        }
    }

    /// The thrown host value, for host exceptions.
    pub fn host_value(&self) -> Option<Value> {
        match self.root() {
            Error::Host(host) => Some(host.value()),
            _ => None,
        }
    }

    /// Renders the error without calling into the host.
    pub(crate) fn describe_offline(&self) -> String {
        match self.root() {
            Error::Host(host) => host.describe_offline(),
            error => error.to_string(),
        }
    }
}

/// An exception thrown by the host.
///
/// The message is `JavaScript error: <message>`, read from the thrown
/// value's `message` property on first display and cached. Reading it is a
/// host call and may itself fail; the message then becomes
/// `failed generating error message: <inner failure>`.
#[derive(Clone)]
pub struct HostError {
    err: raw::Error,
    message: Arc<OnceCell<String>>,
}

impl HostError {
    pub fn new(err: raw::Error) -> Self {
        Self {
            err,
            message: Arc::new(OnceCell::new()),
        }
    }

    /// The thrown value.
    pub fn value(&self) -> Value {
        Value::from_raw(self.err.value)
    }

    pub(crate) fn raw(&self) -> raw::Error {
        self.err
    }

    pub fn message(&self) -> &str {
        self.message.get_or_init(|| self.render())
    }

    fn render(&self) -> String {
        let err = self.err;
        match catch::attempt(move || err.error()) {
            Ok(message) => message,
            Err(failure) => format!("{}{}", MESSAGE_FAILURE_PREFIX, failure.describe_offline()),
        }
    }

    fn describe_offline(&self) -> String {
        match self.message.get() {
            Some(message) => message.clone(),
            None => format!("JavaScript error of type {}", self.err.value.type_of()),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl fmt::Debug for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostError")
            .field("value", &self.err.value)
            .field("message", &self.message.get())
            .finish()
    }
}

impl std::error::Error for HostError {}
