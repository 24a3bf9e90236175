//! Native callbacks exposed to the host.

use crate::catch;
use crate::error::Result;
use crate::raw;
use crate::value::{Native, Value};

/// A Rust callback registered as a host function.
///
/// The callback stays registered until [`Func::release`] is called. Calling
/// the host function after that makes the host throw.
#[derive(Debug, Clone, Copy)]
pub struct Func {
    func: raw::Func,
}

impl Func {
    /// Registers `callback`. It receives `this` and the call arguments as
    /// wrapper values; whatever it returns is converted back for the host.
    pub fn new(callback: impl Fn(Value, &[Value]) -> Native + 'static) -> Result<Func> {
        let trampoline = move |this: raw::Value, args: &[raw::Value]| -> raw::Native {
            let args: Vec<Value> = args.iter().copied().map(Value::from_raw).collect();
            callback(Value::from_raw(this), &args).into_raw()
        };
        catch::attempt(move || raw::func_of(trampoline)).map(Func::from_raw)
    }

    pub fn from_raw(func: raw::Func) -> Self {
        Self { func }
    }

    pub fn into_raw(self) -> raw::Func {
        self.func
    }

    /// Unregisters the callback. Never fails; releasing twice is a no-op.
    pub fn release(&self) {
        self.func.release()
    }

    /// The host function object.
    pub fn value(&self) -> Value {
        Value::from_raw(self.func.value)
    }
}
