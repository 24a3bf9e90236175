//! The raw host-interop surface.
//!
//! This module is an embedded, JavaScript-like host value space. Values are
//! cheap `Copy` handles, and every operation that can go wrong signals it by
//! **panicking**:
//!
//! - type misuse panics with a typed [`ValueError`]
//!   (`call of Value.get on undefined`);
//! - an exception thrown by the host panics with a host [`Error`] carrying
//!   the thrown value;
//! - conversion failures panic with a plain message.
//!
//! Nothing here should be called directly from application code. Use the
//! wrappers at the crate root, which route every call through
//! [`crate::catch`], and run `jsguard` to prove no raw call slipped through.
//! The operations that cannot fail are listed in
//! [`crate::guard::allowlist`].
//!
//! Host values are confined to the thread that created them. Using a value
//! on another thread panics.

mod builtins;
pub(crate) mod realm;

use realm::{Callable, Class, ErrorKind, Ref};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// The type of a host value, as reported by `typeof`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Object,
    Function,
}

impl Type {
    pub fn as_str(&self) -> &'static str {
        match self {
            Type::Undefined => "undefined",
            Type::Null => "null",
            Type::Boolean => "boolean",
            Type::Number => "number",
            Type::String => "string",
            Type::Symbol => "symbol",
            Type::Object => "object",
            Type::Function => "function",
        }
    }

    /// Objects and functions can carry properties.
    pub fn is_object(&self) -> bool {
        matches!(self, Type::Object | Type::Function)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a [`Value`] method is invoked on a value of the wrong type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("call of {method} on {ty}")]
pub struct ValueError {
    pub method: &'static str,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy)]
enum Repr {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Ref(Ref),
}

/// A handle to a host value.
///
/// Handles are plain data: copying one never touches the host, and neither
/// does inspecting its [`Type`].
#[derive(Debug, Clone, Copy)]
pub struct Value {
    repr: Repr,
}

/// An exception thrown by the host.
#[derive(Debug, Clone, Copy)]
pub struct Error {
    /// The thrown value.
    pub value: Value,
}

impl Error {
    /// Renders the exception as `JavaScript error: <message>`.
    ///
    /// Panics when the thrown value has no readable `message` property.
    pub fn error(&self) -> String {
        format!("JavaScript error: {}", self.value.get("message").string())
    }
}

/// A native callback registered with the host.
#[derive(Debug, Clone, Copy)]
pub struct Func {
    /// The host function object that calls back into Rust.
    pub value: Value,
    id: u32,
}

impl Func {
    /// Unregisters the callback. Calling the function afterwards makes the
    /// host throw. Releasing twice is a no-op.
    pub fn release(&self) {
        if let Some(r) = self.value.heap_ref() {
            let _ = realm::try_with(|realm| {
                if realm.owns(r) {
                    realm.release_callback(self.id);
                }
            });
        }
    }
}

/// Rust data accepted wherever the host expects a value.
#[derive(Debug, Clone, Default)]
pub enum Native {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Value(Value),
    Func(Func),
    Error(Error),
    Array(Vec<Native>),
    Object(BTreeMap<String, Native>),
}

macro_rules! native_from_number {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Native {
            fn from(n: $ty) -> Self {
                Native::Number(n as f64)
            }
        })*
    };
}

native_from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<bool> for Native {
    fn from(b: bool) -> Self {
        Native::Bool(b)
    }
}

impl From<&str> for Native {
    fn from(s: &str) -> Self {
        Native::String(s.to_string())
    }
}

impl From<String> for Native {
    fn from(s: String) -> Self {
        Native::String(s)
    }
}

impl From<Value> for Native {
    fn from(v: Value) -> Self {
        Native::Value(v)
    }
}

impl From<Func> for Native {
    fn from(f: Func) -> Self {
        Native::Func(f)
    }
}

impl From<Error> for Native {
    fn from(e: Error) -> Self {
        Native::Error(e)
    }
}

impl From<()> for Native {
    fn from(_: ()) -> Self {
        Native::Undefined
    }
}

impl<T: Into<Native>> From<Option<T>> for Native {
    fn from(value: Option<T>) -> Self {
        value.map_or(Native::Null, Into::into)
    }
}

impl<T: Into<Native>> From<Vec<T>> for Native {
    fn from(items: Vec<T>) -> Self {
        Native::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Native>> From<BTreeMap<String, T>> for Native {
    fn from(map: BTreeMap<String, T>) -> Self {
        Native::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// Renders a number the way the host's `String(n)` does.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{n}")
    }
}

fn throw(value: Value) -> ! {
    std::panic::panic_any(Error { value })
}

impl Value {
    pub(crate) fn from_ref(r: Ref) -> Self {
        Self { repr: Repr::Ref(r) }
    }

    pub(crate) fn heap_ref(&self) -> Option<Ref> {
        match self.repr {
            Repr::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn undefined() -> Self {
        Self {
            repr: Repr::Undefined,
        }
    }

    pub(crate) fn number(n: f64) -> Self {
        Self {
            repr: Repr::Number(n),
        }
    }

    pub(crate) fn as_number(&self) -> Option<f64> {
        match self.repr {
            Repr::Number(n) => Some(n),
            _ => None,
        }
    }

    pub(crate) fn as_bool(&self) -> Option<bool> {
        match self.repr {
            Repr::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Identity of the handle: same inline primitive or same heap slot.
    pub(crate) fn same_handle(&self, other: &Value) -> bool {
        match (self.repr, other.repr) {
            (Repr::Undefined, Repr::Undefined) | (Repr::Null, Repr::Null) => true,
            (Repr::Bool(a), Repr::Bool(b)) => a == b,
            (Repr::Number(a), Repr::Number(b)) => a.to_bits() == b.to_bits(),
            (Repr::Ref(a), Repr::Ref(b)) => a == b,
            _ => false,
        }
    }

    fn expect_object(&self, method: &'static str) -> Ref {
        match self.repr {
            Repr::Ref(r) if r.ty.is_object() => r,
            _ => std::panic::panic_any(ValueError {
                method,
                ty: self.type_of(),
            }),
        }
    }

    fn expect_function(&self, method: &'static str) -> Value {
        if self.type_of() != Type::Function {
            std::panic::panic_any(ValueError {
                method,
                ty: self.type_of(),
            });
        }
        *self
    }

    pub fn type_of(&self) -> Type {
        match self.repr {
            Repr::Undefined => Type::Undefined,
            Repr::Null => Type::Null,
            Repr::Bool(_) => Type::Boolean,
            Repr::Number(_) => Type::Number,
            Repr::Ref(r) => r.ty,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.repr, Repr::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.repr, Repr::Null)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self.repr, Repr::Number(n) if n.is_nan())
    }

    /// Strict equality (`===`). Values from another thread are never equal
    /// to anything but their own handle.
    pub fn equal(&self, other: &Value) -> bool {
        match (self.repr, other.repr) {
            (Repr::Number(a), Repr::Number(b)) => a == b,
            (Repr::Ref(a), Repr::Ref(b)) if a == b => true,
            (Repr::Ref(a), Repr::Ref(b)) if a.ty == Type::String && b.ty == Type::String => {
                realm::try_with(|realm| {
                    if !(realm.owns(a) && realm.owns(b)) {
                        return false;
                    }
                    realm.string(a) == realm.string(b)
                })
                .unwrap_or(false)
            }
            _ => self.same_handle(other),
        }
    }

    pub fn get(&self, p: &str) -> Value {
        let r = self.expect_object("Value.get");
        realm::with(|realm| realm.get_property(r, p))
    }

    pub fn set(&self, p: &str, x: impl Into<Native>) {
        let r = self.expect_object("Value.set");
        let x = value_of(x);
        realm::with(|realm| realm.set_property(r, p, x));
    }

    pub fn delete(&self, p: &str) {
        let r = self.expect_object("Value.delete");
        realm::with(|realm| realm.delete_property(r, p));
    }

    pub fn index(&self, i: usize) -> Value {
        let r = self.expect_object("Value.index");
        realm::with(|realm| realm.get_property(r, &i.to_string()))
    }

    pub fn set_index(&self, i: usize, x: impl Into<Native>) {
        let r = self.expect_object("Value.set_index");
        let x = value_of(x);
        realm::with(|realm| realm.set_property(r, &i.to_string(), x));
    }

    pub fn length(&self) -> usize {
        let r = self.expect_object("Value.length");
        realm::with(|realm| realm.get_property(r, "length"))
            .as_number()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map_or(0, |n| n as usize)
    }

    /// Calls method `m` with `this` bound to the value.
    pub fn call(&self, m: &str, args: &[Native]) -> Value {
        let r = self.expect_object("Value.call");
        let method = realm::with(|realm| realm.get_property(r, m));
        if method.type_of() != Type::Function {
            panic!(
                "Value.call: property {} is not a function, got {}",
                m,
                method.type_of()
            );
        }
        let args = values_of(args);
        realm::apply(method, *self, &args, false).unwrap_or_else(|thrown| throw(thrown))
    }

    /// Calls the value as a function with `this` undefined.
    pub fn invoke(&self, args: &[Native]) -> Value {
        let function = self.expect_function("Value.invoke");
        let args = values_of(args);
        realm::apply(function, Value::undefined(), &args, false)
            .unwrap_or_else(|thrown| throw(thrown))
    }

    /// Uses the value as a constructor (`new v(...args)`).
    pub fn new(&self, args: &[Native]) -> Value {
        let function = self.expect_function("Value.new");
        let args = values_of(args);
        realm::apply(function, Value::undefined(), &args, true)
            .unwrap_or_else(|thrown| throw(thrown))
    }

    /// `v instanceof t`.
    pub fn instance_of(&self, t: &Value) -> bool {
        let ty = t.type_of();
        if !ty.is_object() {
            throw(realm::new_error(
                ErrorKind::TypeError,
                "Right-hand side of 'instanceof' is not an object",
            ));
        }
        if ty != Type::Function {
            throw(realm::new_error(
                ErrorKind::TypeError,
                "Right-hand side of 'instanceof' is not callable",
            ));
        }
        let prototype = t.get("prototype");
        let Some(target) = prototype.heap_ref().filter(|r| r.ty.is_object()) else {
            throw(realm::new_error(
                ErrorKind::TypeError,
                &format!(
                    "Function has non-object prototype '{}' in instanceof check",
                    builtins::to_js_string(prototype)
                ),
            ));
        };
        let Some(start) = self.heap_ref().filter(|r| r.ty.is_object()) else {
            return false;
        };
        realm::with(|realm| {
            let mut current = realm.object(start).and_then(|o| o.proto);
            while let Some(proto) = current.and_then(|p| p.heap_ref()) {
                if proto == target {
                    return true;
                }
                current = realm.object(proto).and_then(|o| o.proto);
            }
            false
        })
    }

    pub fn bool(&self) -> bool {
        match self.repr {
            Repr::Bool(b) => b,
            _ => std::panic::panic_any(ValueError {
                method: "Value.bool",
                ty: self.type_of(),
            }),
        }
    }

    pub fn float(&self) -> f64 {
        match self.repr {
            Repr::Number(n) => n,
            _ => std::panic::panic_any(ValueError {
                method: "Value.float",
                ty: self.type_of(),
            }),
        }
    }

    pub fn int(&self) -> i64 {
        match self.repr {
            Repr::Number(n) => n as i64,
            _ => std::panic::panic_any(ValueError {
                method: "Value.int",
                ty: self.type_of(),
            }),
        }
    }

    /// The string contents of a string value, or a `<type: value>`
    /// placeholder for anything else.
    pub fn string(&self) -> String {
        match self.repr {
            Repr::Undefined => "<undefined>".to_string(),
            Repr::Null => "<null>".to_string(),
            Repr::Bool(b) => format!("<boolean: {b}>"),
            Repr::Number(n) => format!("<number: {}>", format_number(n)),
            Repr::Ref(r) => match r.ty {
                Type::String => realm::with(|realm| realm.string(r))
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                ty => {
                    realm::with(|realm| {
                        realm.slot(r);
                    });
                    format!("<{ty}>")
                }
            },
        }
    }

    /// Host truthiness.
    pub fn truthy(&self) -> bool {
        match self.repr {
            Repr::Undefined | Repr::Null => false,
            Repr::Bool(b) => b,
            Repr::Number(n) => n != 0.0 && !n.is_nan(),
            Repr::Ref(r) => match r.ty {
                Type::String => {
                    realm::with(|realm| realm.string(r)).is_some_and(|s| !s.is_empty())
                }
                _ => {
                    realm::with(|realm| {
                        realm.slot(r);
                    });
                    true
                }
            },
        }
    }
}

/// The host's global object.
pub fn global() -> Value {
    realm::with(|realm| realm.intrinsics().global)
}

pub fn null() -> Value {
    Value { repr: Repr::Null }
}

pub fn undefined() -> Value {
    Value::undefined()
}

/// Converts Rust data into a host value, allocating strings, arrays and
/// objects in this thread's realm.
///
/// Panics when handed a released [`Func`].
pub fn value_of(x: impl Into<Native>) -> Value {
    match x.into() {
        Native::Undefined => Value::undefined(),
        Native::Null => null(),
        Native::Bool(b) => Value {
            repr: Repr::Bool(b),
        },
        Native::Number(n) => Value::number(n),
        Native::String(s) => realm::with(|realm| realm.alloc_string(&s)),
        Native::Value(v) => v,
        Native::Error(e) => e.value,
        Native::Func(f) => {
            if !realm::with(|realm| realm.is_registered(f.id)) {
                panic!("ValueOf: invalid value: released function");
            }
            f.value
        }
        Native::Array(items) => {
            let items = items.into_iter().map(value_of).collect();
            builtins::new_array(items)
        }
        Native::Object(map) => {
            let entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, value_of(v))).collect();
            realm::with(|realm| {
                let proto = realm.intrinsics().object_proto;
                let object = realm.alloc_object(Class::Plain, Some(proto));
                for (key, value) in &entries {
                    realm.define(object, key, *value);
                }
                object
            })
        }
    }
}

fn values_of(args: &[Native]) -> Vec<Value> {
    args.iter().cloned().map(value_of).collect()
}

/// Registers `f` as a host function. `this` and the arguments are handed
/// over as raw values; the returned [`Native`] is converted back with
/// [`value_of`].
pub fn func_of(f: impl Fn(Value, &[Value]) -> Native + 'static) -> Func {
    realm::with(|realm| {
        let id = realm.register_callback(Rc::new(f));
        let value = realm.alloc_function("", Callable::Callback(id));
        Func { value, id }
    })
}

fn bytes_of<R>(value: &Value, f: impl FnOnce(&mut Vec<u8>) -> R) -> Option<R> {
    let r = value.heap_ref().filter(|r| r.ty == Type::Object)?;
    realm::with(|realm| realm.bytes_mut(r).map(f))
}

/// Copies bytes from a host `Uint8Array` / `Uint8ClampedArray` into `dst`,
/// returning how many were copied.
pub fn copy_bytes_to_rust(dst: &mut [u8], src: Value) -> usize {
    bytes_of(&src, |data| {
        let n = dst.len().min(data.len());
        dst[..n].copy_from_slice(&data[..n]);
        n
    })
    .unwrap_or_else(|| {
        panic!("copy_bytes_to_rust: expected src to be an Uint8Array or Uint8ClampedArray")
    })
}

/// Copies `src` into a host `Uint8Array` / `Uint8ClampedArray`, returning
/// how many bytes were copied.
pub fn copy_bytes_to_js(dst: Value, src: &[u8]) -> usize {
    bytes_of(&dst, |data| {
        let n = src.len().min(data.len());
        data[..n].copy_from_slice(&src[..n]);
        n
    })
    .unwrap_or_else(|| {
        panic!("copy_bytes_to_js: expected dst to be an Uint8Array or Uint8ClampedArray")
    })
}
