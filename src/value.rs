//! Safe handles over host values.

use crate::catch;
use crate::error::{Error, HostError, Result};
use crate::func::Func;
use crate::raw::{self, Type};
use std::collections::{BTreeMap, HashMap};

/// A host value whose every fallible operation returns a [`Result`].
///
/// Wrapping and unwrapping are free: a `Value` is the raw handle and nothing
/// else. Values are confined to the thread that created them, and the
/// wrapper adds no synchronization of its own.
#[derive(Debug, Clone, Copy)]
pub struct Value {
    raw: raw::Value,
}

/// Rust data that can be handed to the host.
///
/// Wrapper handles nested anywhere inside lists or maps are unwrapped
/// before the data reaches the raw layer.
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
    Error(HostError),
    Array(Vec<Native>),
    Object(BTreeMap<String, Native>),
}

impl Native {
    /// Unwraps every wrapper handle, recursively.
    pub fn into_raw(self) -> raw::Native {
        match self {
            Native::Undefined => raw::Native::Undefined,
            Native::Null => raw::Native::Null,
            Native::Bool(b) => raw::Native::Bool(b),
            Native::Number(n) => raw::Native::Number(n),
            Native::String(s) => raw::Native::String(s),
            Native::Value(v) => raw::Native::Value(v.into_raw()),
            Native::Func(f) => raw::Native::Func(f.into_raw()),
            Native::Error(e) => raw::Native::Error(e.raw()),
            Native::Array(items) => {
                raw::Native::Array(items.into_iter().map(Native::into_raw).collect())
            }
            Native::Object(map) => raw::Native::Object(
                map.into_iter()
                    .map(|(key, value)| (key, value.into_raw()))
                    .collect(),
            ),
        }
    }
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

impl From<HostError> for Native {
    fn from(e: HostError) -> Self {
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

impl<T: Into<Native>> From<HashMap<String, T>> for Native {
    fn from(map: HashMap<String, T>) -> Self {
        Native::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

fn raw_args(args: &[Native]) -> Vec<raw::Native> {
    args.iter().cloned().map(Native::into_raw).collect()
}

/// Converts Rust data into a host value.
pub fn value_of(x: impl Into<Native>) -> Result<Value> {
    let x = x.into().into_raw();
    catch::attempt(move || raw::value_of(x)).map(Value::from_raw)
}

impl Value {
    pub fn from_raw(raw: raw::Value) -> Self {
        Self { raw }
    }

    pub fn into_raw(self) -> raw::Value {
        self.raw
    }

    pub fn bool(&self) -> Result<bool> {
        let v = self.raw;
        catch::attempt(move || v.bool())
    }

    /// Calls method `m` on the value.
    pub fn call(&self, m: &str, args: &[Native]) -> Result<Value> {
        let v = self.raw;
        let args = raw_args(args);
        catch::attempt(move || v.call(m, &args)).map(Value::from_raw)
    }

    pub fn delete(&self, p: &str) -> Result<()> {
        let v = self.raw;
        catch::attempt_side_effect(move || v.delete(p))
    }

    /// Strict equality. Never fails.
    pub fn equal(&self, w: &Value) -> bool {
        self.raw.equal(&w.raw)
    }

    pub fn float(&self) -> Result<f64> {
        let v = self.raw;
        catch::attempt(move || v.float())
    }

    pub fn get(&self, p: &str) -> Result<Value> {
        let v = self.raw;
        catch::attempt(move || v.get(p)).map(Value::from_raw)
    }

    pub fn index(&self, i: usize) -> Result<Value> {
        let v = self.raw;
        catch::attempt(move || v.index(i)).map(Value::from_raw)
    }

    /// `self instanceof t`.
    ///
    /// `t` must be a function whose `prototype` is an object. Anything else
    /// fails here, before the host is asked, with a message naming what was
    /// wrong instead of the host's generic type error.
    pub fn instance_of(&self, t: &Value) -> Result<bool> {
        if t.type_of() != Type::Function {
            return Err(Error::InstanceOfType(t.type_of()));
        }
        let prototype = t
            .get("prototype")
            .map_err(|err| Error::InstanceOfConstructor(err.to_string()))?;
        if prototype.type_of() != Type::Object {
            return Err(Error::InstanceOfConstructor(
                prototype.type_of().to_string(),
            ));
        }
        let (v, t) = (self.raw, t.raw);
        catch::attempt(move || v.instance_of(&t))
    }

    pub fn int(&self) -> Result<i64> {
        let v = self.raw;
        catch::attempt(move || v.int())
    }

    /// Calls the value as a function.
    pub fn invoke(&self, args: &[Native]) -> Result<Value> {
        let v = self.raw;
        let args = raw_args(args);
        catch::attempt(move || v.invoke(&args)).map(Value::from_raw)
    }

    /// Never fails.
    pub fn is_nan(&self) -> bool {
        self.raw.is_nan()
    }

    /// Never fails.
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    /// Never fails.
    pub fn is_undefined(&self) -> bool {
        self.raw.is_undefined()
    }

    pub fn length(&self) -> Result<usize> {
        let v = self.raw;
        catch::attempt(move || v.length())
    }

    /// Uses the value as a constructor.
    pub fn new(&self, args: &[Native]) -> Result<Value> {
        let v = self.raw;
        let args = raw_args(args);
        catch::attempt(move || v.new(&args)).map(Value::from_raw)
    }

    pub fn set(&self, p: &str, x: impl Into<Native>) -> Result<()> {
        let v = self.raw;
        let x = x.into().into_raw();
        catch::attempt_side_effect(move || v.set(p, x))
    }

    pub fn set_index(&self, i: usize, x: impl Into<Native>) -> Result<()> {
        let v = self.raw;
        let x = x.into().into_raw();
        catch::attempt_side_effect(move || v.set_index(i, x))
    }

    pub fn string(&self) -> Result<String> {
        let v = self.raw;
        catch::attempt(move || v.string())
    }

    pub fn truthy(&self) -> Result<bool> {
        let v = self.raw;
        catch::attempt(move || v.truthy())
    }

    /// Never fails.
    pub fn type_of(&self) -> Type {
        self.raw.type_of()
    }
}

impl From<raw::Value> for Value {
    fn from(raw: raw::Value) -> Self {
        Value::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{global, null, undefined};

    #[test]
    fn test_get_and_set() {
        let object = value_of(Native::Object(BTreeMap::new())).unwrap();
        object.set("answer", 42).unwrap();
        assert_eq!(object.get("answer").unwrap().int().unwrap(), 42);
        object.delete("answer").unwrap();
        assert!(object.get("answer").unwrap().is_undefined());
    }

    #[test]
    fn test_get_on_undefined_is_an_error() {
        let err = undefined().get("foo").unwrap_err();
        assert_eq!(err.to_string(), "call of Value.get on undefined");
    }

    #[test]
    fn test_type_conversions_fail_on_wrong_type() {
        let s = value_of("text").unwrap();
        assert_eq!(s.string().unwrap(), "text");
        assert_eq!(
            s.int().unwrap_err().to_string(),
            "call of Value.int on string"
        );
        assert_eq!(
            null().bool().unwrap_err().to_string(),
            "call of Value.bool on null"
        );
        assert!(value_of(0).unwrap().truthy().map(|b| !b).unwrap());
    }

    #[test]
    fn test_array_operations() {
        let array = global()
            .get("Array")
            .unwrap()
            .new(&[Native::from("a"), Native::from("b")])
            .unwrap();
        assert_eq!(array.length().unwrap(), 2);
        array.set_index(3, true).unwrap();
        assert_eq!(array.length().unwrap(), 4);
        assert!(array.index(2).unwrap().is_undefined());
        assert!(array.index(3).unwrap().bool().unwrap());
        let len = array.call("push", &[Native::from(1)]).unwrap();
        assert_eq!(len.int().unwrap(), 5);
    }

    #[test]
    fn test_nested_wrapper_values_are_unwrapped() {
        let inner = value_of("inner").unwrap();
        let mut map = BTreeMap::new();
        map.insert("list".to_string(), Native::from(vec![Native::from(inner)]));
        let outer = value_of(map).unwrap();
        let first = outer.get("list").unwrap().index(0).unwrap();
        assert!(first.equal(&inner));
    }

    #[test]
    fn test_instance_of_prechecks() {
        let err = global().get("Error").unwrap();
        let thrown = err.new(&[Native::from("x")]).unwrap();
        assert!(thrown.instance_of(&err).unwrap());

        assert_eq!(
            thrown.instance_of(&value_of(1).unwrap()).unwrap_err().to_string(),
            "invalid type for instanceof: number"
        );

        let ctor = Func::new(|_, _| Native::Undefined).unwrap();
        ctor.value().set("prototype", 5).unwrap();
        assert_eq!(
            thrown.instance_of(&ctor.value()).unwrap_err().to_string(),
            "invalid constructor type for instanceof: number"
        );
        ctor.release();
    }

    #[test]
    fn test_invoke_non_function() {
        let err = value_of("f").unwrap().invoke(&[]).unwrap_err();
        assert_eq!(err.to_string(), "call of Value.invoke on string");
    }

    #[test]
    fn test_safe_unsafe_round_trip() {
        let raw = raw::value_of("round trip");
        assert!(Value::from_raw(raw).into_raw().same_handle(&raw));
    }
}
