//! Panic-free access to a JavaScript-like host.
//!
//! The [`raw`] layer reports every failure by panicking. The wrappers
//! exported here run each raw operation inside [`catch::attempt`] and hand
//! back a [`Result`] instead:
//!
//! ```rust
//! use safejs::{global, value_of, Native};
//!
//! let array = global().get("Array")?.new(&[Native::from(2)])?;
//! assert_eq!(array.length()?, 2);
//! assert_eq!(
//!     value_of("text")?.int().unwrap_err().to_string(),
//!     "call of Value.int on string"
//! );
//! # Ok::<(), safejs::Error>(())
//! ```
//!
//! The [`guard`] module (and the `jsguard` binary built on it) checks that
//! no raw call escapes the recovery boundary.

pub mod catch;
pub mod cli;
pub mod config;
pub mod guard;
pub mod io;
pub mod observability;
pub mod raw;

mod bytes;
mod error;
mod func;
mod global;
mod value;

pub use bytes::{copy_bytes_to_js, copy_bytes_to_rust};
pub use catch::{attempt, attempt_side_effect};
pub use error::{Error, ErrorKind, HostError, Result, MESSAGE_FAILURE_PREFIX};
pub use func::Func;
pub use global::{global, null, undefined};
pub use raw::Type;
pub use value::{value_of, Native, Value};
