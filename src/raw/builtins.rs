//! Objects installed on the global object of every realm.

use super::realm::{self, Builtin, Callable, Class, ErrorKind, Intrinsics, Realm};
use super::{format_number, Type, Value};

/// Largest length accepted by the `Array` and byte-array constructors.
const MAX_LENGTH: f64 = (1u64 << 24) as f64;

pub(crate) fn install(realm: &mut Realm) -> Intrinsics {
    let object_proto = realm.alloc_object(Class::Plain, None);
    let function_proto = realm.alloc_object(Class::Plain, Some(object_proto));
    let global = realm.alloc_object(Class::Plain, Some(object_proto));
    let installer = Installer {
        global,
        function_proto,
    };

    installer.constructor(realm, "Object", object_ctor, object_proto);

    let array_proto = realm.alloc_object(Class::Plain, Some(object_proto));
    installer.constructor(realm, "Array", array_ctor, array_proto);
    installer.method(realm, array_proto, "push", array_push);

    let error_proto = installer.error_prototype(realm, "Error", object_proto);
    installer.constructor(realm, "Error", error_ctor, error_proto);
    let type_error_proto = installer.error_prototype(realm, "TypeError", error_proto);
    installer.constructor(realm, "TypeError", type_error_ctor, type_error_proto);
    let range_error_proto = installer.error_prototype(realm, "RangeError", error_proto);
    installer.constructor(realm, "RangeError", range_error_ctor, range_error_proto);

    let uint8_proto = realm.alloc_object(Class::Plain, Some(object_proto));
    installer.constructor(realm, "Uint8Array", uint8_ctor, uint8_proto);
    let uint8_clamped_proto = realm.alloc_object(Class::Plain, Some(object_proto));
    installer.constructor(
        realm,
        "Uint8ClampedArray",
        uint8_clamped_ctor,
        uint8_clamped_proto,
    );

    let symbol_proto = realm.alloc_object(Class::Plain, Some(object_proto));
    installer.constructor(realm, "Symbol", symbol_ctor, symbol_proto);

    realm.define(global, "globalThis", global);

    Intrinsics {
        global,
        object_proto,
        function_proto,
        array_proto,
        error_proto,
        type_error_proto,
        range_error_proto,
        uint8_proto,
        uint8_clamped_proto,
    }
}

struct Installer {
    global: Value,
    function_proto: Value,
}

impl Installer {
    fn function(&self, realm: &mut Realm, name: &str, f: Builtin) -> Value {
        let function = realm.alloc_object(
            Class::Function(Callable::Builtin(f)),
            Some(self.function_proto),
        );
        let name = realm.alloc_string(name);
        realm.define(function, "name", name);
        function
    }

    fn constructor(&self, realm: &mut Realm, name: &str, f: Builtin, prototype: Value) -> Value {
        let function = self.function(realm, name, f);
        realm.define(function, "prototype", prototype);
        realm.define(prototype, "constructor", function);
        realm.define(self.global, name, function);
        function
    }

    fn method(&self, realm: &mut Realm, target: Value, name: &str, f: Builtin) {
        let function = self.function(realm, name, f);
        realm.define(target, name, function);
    }

    fn error_prototype(&self, realm: &mut Realm, name: &str, parent: Value) -> Value {
        let proto = realm.alloc_object(Class::Plain, Some(parent));
        let name = realm.alloc_string(name);
        let message = realm.alloc_string("");
        realm.define(proto, "name", name);
        realm.define(proto, "message", message);
        proto
    }
}

/// Host `String(v)` conversion.
pub(crate) fn to_js_string(value: Value) -> String {
    match value.type_of() {
        Type::Undefined => "undefined".to_string(),
        Type::Null => "null".to_string(),
        Type::Boolean => value.as_bool().unwrap_or(false).to_string(),
        Type::Number => format_number(value.as_number().unwrap_or(f64::NAN)),
        Type::String => value
            .heap_ref()
            .and_then(|r| realm::with(|realm| realm.string(r)))
            .map(|s| s.to_string())
            .unwrap_or_default(),
        Type::Symbol => "Symbol()".to_string(),
        Type::Object => "[object Object]".to_string(),
        Type::Function => "function () { [native code] }".to_string(),
    }
}

fn length_arg(value: &Value) -> Option<usize> {
    let n = value.as_number()?;
    if n.fract() != 0.0 || !(0.0..=MAX_LENGTH).contains(&n) {
        return None;
    }
    Some(n as usize)
}

pub(crate) fn new_array(items: Vec<Value>) -> Value {
    realm::with(|realm| {
        let proto = realm.intrinsics().array_proto;
        realm.alloc_object(Class::Array(items), Some(proto))
    })
}

fn object_ctor(_this: Value, args: &[Value], _construct: bool) -> Result<Value, Value> {
    match args.first() {
        Some(value) if value.type_of().is_object() => Ok(*value),
        _ => Ok(realm::with(|realm| {
            let proto = realm.intrinsics().object_proto;
            realm.alloc_object(Class::Plain, Some(proto))
        })),
    }
}

fn array_ctor(_this: Value, args: &[Value], _construct: bool) -> Result<Value, Value> {
    let items = match args {
        [len] if len.type_of() == Type::Number => match length_arg(len) {
            Some(len) => vec![Value::undefined(); len],
            None => {
                return Err(realm::new_error(
                    ErrorKind::RangeError,
                    "Invalid array length",
                ))
            }
        },
        _ => args.to_vec(),
    };
    Ok(new_array(items))
}

fn array_push(this: Value, args: &[Value], _construct: bool) -> Result<Value, Value> {
    let len = this.heap_ref().and_then(|r| {
        realm::with(|realm| {
            realm.array_mut(r).map(|items| {
                items.extend_from_slice(args);
                items.len()
            })
        })
    });
    match len {
        Some(len) => Ok(Value::number(len as f64)),
        None => Err(realm::new_error(
            ErrorKind::TypeError,
            "Array.prototype.push called on a non-array",
        )),
    }
}

fn make_error(kind: ErrorKind, args: &[Value]) -> Result<Value, Value> {
    let message = match args.first() {
        Some(value) if !value.is_undefined() => to_js_string(*value),
        _ => String::new(),
    };
    let error = realm::new_error(kind, &message);
    if message.is_empty() {
        if let Some(r) = error.heap_ref() {
            realm::with(|realm| realm.delete_property(r, "message"));
        }
    }
    Ok(error)
}

fn error_ctor(_this: Value, args: &[Value], _construct: bool) -> Result<Value, Value> {
    make_error(ErrorKind::Error, args)
}

fn type_error_ctor(_this: Value, args: &[Value], _construct: bool) -> Result<Value, Value> {
    make_error(ErrorKind::TypeError, args)
}

fn range_error_ctor(_this: Value, args: &[Value], _construct: bool) -> Result<Value, Value> {
    make_error(ErrorKind::RangeError, args)
}

fn byte_array(name: &str, args: &[Value], construct: bool, clamped: bool) -> Result<Value, Value> {
    if !construct {
        return Err(realm::new_error(
            ErrorKind::TypeError,
            &format!("Constructor {name} requires 'new'"),
        ));
    }
    let data = match args.first() {
        None => Vec::new(),
        Some(len) if len.type_of() == Type::Number => match length_arg(len) {
            Some(len) => vec![0; len],
            None => {
                return Err(realm::new_error(
                    ErrorKind::RangeError,
                    &format!("Invalid typed array length: {}", to_js_string(*len)),
                ))
            }
        },
        Some(source) => {
            let items = source
                .heap_ref()
                .and_then(|r| realm::with(|realm| realm.array_mut(r).map(|items| items.clone())))
                .unwrap_or_default();
            items
                .iter()
                .map(|item| realm::to_byte(item.as_number().unwrap_or(0.0), clamped))
                .collect()
        }
    };
    Ok(realm::with(|realm| {
        let intrinsics = realm.intrinsics();
        let proto = if clamped {
            intrinsics.uint8_clamped_proto
        } else {
            intrinsics.uint8_proto
        };
        realm.alloc_object(Class::Bytes { data, clamped }, Some(proto))
    }))
}

fn uint8_ctor(_this: Value, args: &[Value], construct: bool) -> Result<Value, Value> {
    byte_array("Uint8Array", args, construct, false)
}

fn uint8_clamped_ctor(_this: Value, args: &[Value], construct: bool) -> Result<Value, Value> {
    byte_array("Uint8ClampedArray", args, construct, true)
}

fn symbol_ctor(_this: Value, args: &[Value], construct: bool) -> Result<Value, Value> {
    if construct {
        return Err(realm::new_error(
            ErrorKind::TypeError,
            "Symbol is not a constructor",
        ));
    }
    let description = args
        .first()
        .filter(|value| !value.is_undefined())
        .map(|value| to_js_string(*value));
    Ok(realm::with(|realm| realm.alloc_symbol(description)))
}
