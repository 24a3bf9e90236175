//! Raw operations that are safe to call without a recovery boundary.
//!
//! The table is closed. Anything under the raw module path that is not
//! listed here must go through `catch::attempt`, including operations
//! added to the raw module after this table was written.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Canonical path of the raw module as seen from a dependent crate.
pub const RAW_PATH: &str = "safejs::raw";

/// Operations that never panic, relative to the raw module.
static SAFE_OPERATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "global",
        "null",
        "undefined",
        "Func::release",
        "Type::as_str",
        "Type::to_string",
        "Type::is_object",
        "Value::equal",
        "Value::is_nan",
        "Value::is_null",
        "Value::is_undefined",
        "Value::type_of",
        // Plain data conversions, no host involved
        "Native::from",
        "Native::default",
        "Native::clone",
        "Value::into",
        "Func::into",
        "Error::into",
        "ValueError::to_string",
        // Handles are `Copy`
        "Value::clone",
        "Func::clone",
        "Error::clone",
        "Type::clone",
        "ValueError::clone",
    ]
    .into_iter()
    .collect()
});

/// Whether `operation` on `type_name` may be called unwrapped, for the
/// raw module at [`RAW_PATH`].
///
/// `type_name` is either the module path itself (free functions) or a
/// type inside it (`safejs::raw::Value`). Types outside the module are
/// always safe.
pub fn is_safe(type_name: &str, operation: &str) -> bool {
    Allowlist::new(RAW_PATH).is_safe(type_name, operation)
}

/// The allowlist anchored at a particular raw module path, such as
/// `crate::raw` when checking the wrapper crate itself.
#[derive(Debug, Clone)]
pub struct Allowlist {
    prefix: String,
}

impl Allowlist {
    pub fn new(raw_path: &str) -> Self {
        Self {
            prefix: format!("{raw_path}::"),
        }
    }

    pub fn is_safe(&self, type_name: &str, operation: &str) -> bool {
        let name = format!("{type_name}::{operation}");
        match name.strip_prefix(&self.prefix) {
            Some(relative) => SAFE_OPERATIONS.contains(relative),
            None => true,
        }
    }
}
