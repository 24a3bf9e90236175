//! Thread-confined storage for host values.
//!
//! Every thread lazily owns one [`Realm`]: a slot arena holding strings,
//! symbols and objects, plus the table of registered native callbacks.
//! Primitive values (undefined, null, booleans, numbers) live inline in the
//! handle, everything else is an index into the owning realm. Slots are never
//! reclaimed while the thread lives.
//!
//! No function in this module invokes a host function while the realm is
//! borrowed; callables are cloned out first and run unborrowed so that
//! callbacks may re-enter the realm freely.

use super::builtins;
use super::{Native, Type, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REALM_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static REALM: RefCell<Realm> = RefCell::new(Realm::new());
}

/// Signature of functions implemented by the host itself.
pub(crate) type Builtin = fn(this: Value, args: &[Value], construct: bool) -> Result<Value, Value>;

/// Signature of callbacks registered through `func_of`.
pub(crate) type Callback = dyn Fn(Value, &[Value]) -> Native;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Ref {
    pub(crate) realm: u64,
    pub(crate) index: u32,
    pub(crate) ty: Type,
}

pub(crate) enum Slot {
    String(Rc<str>),
    Symbol(Option<String>),
    Object(Object),
}

pub(crate) struct Object {
    pub(crate) class: Class,
    pub(crate) props: BTreeMap<String, Value>,
    pub(crate) proto: Option<Value>,
}

pub(crate) enum Class {
    Plain,
    Array(Vec<Value>),
    Bytes { data: Vec<u8>, clamped: bool },
    Function(Callable),
}

#[derive(Clone, Copy)]
pub(crate) enum Callable {
    Builtin(Builtin),
    Callback(u32),
}

/// A callable cloned out of the realm, ready to run unborrowed.
enum Invocable {
    Builtin(Builtin),
    Callback(Option<Rc<Callback>>),
}

/// Well-known objects created with every realm.
#[derive(Clone, Copy)]
pub(crate) struct Intrinsics {
    pub(crate) global: Value,
    pub(crate) object_proto: Value,
    pub(crate) function_proto: Value,
    pub(crate) array_proto: Value,
    pub(crate) error_proto: Value,
    pub(crate) type_error_proto: Value,
    pub(crate) range_error_proto: Value,
    pub(crate) uint8_proto: Value,
    pub(crate) uint8_clamped_proto: Value,
}

/// Kinds of error objects the host raises on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    Error,
    TypeError,
    RangeError,
}

pub(crate) struct Realm {
    id: u64,
    slots: Vec<Slot>,
    callbacks: HashMap<u32, Rc<Callback>>,
    next_callback: u32,
    intrinsics: Option<Intrinsics>,
}

impl Realm {
    fn new() -> Self {
        let mut realm = Self {
            id: NEXT_REALM_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            callbacks: HashMap::new(),
            next_callback: 0,
            intrinsics: None,
        };
        let intrinsics = builtins::install(&mut realm);
        realm.intrinsics = Some(intrinsics);
        realm
    }

    pub(crate) fn intrinsics(&self) -> Intrinsics {
        match self.intrinsics {
            Some(intrinsics) => intrinsics,
            None => panic!("host realm used before its intrinsics were installed"),
        }
    }

    fn push(&mut self, slot: Slot, ty: Type) -> Value {
        let index = u32::try_from(self.slots.len())
            .unwrap_or_else(|_| panic!("host realm exhausted its value slots"));
        self.slots.push(slot);
        Value::from_ref(Ref {
            realm: self.id,
            index,
            ty,
        })
    }

    pub(crate) fn alloc_string(&mut self, s: &str) -> Value {
        self.push(Slot::String(Rc::from(s)), Type::String)
    }

    pub(crate) fn alloc_symbol(&mut self, description: Option<String>) -> Value {
        self.push(Slot::Symbol(description), Type::Symbol)
    }

    pub(crate) fn alloc_object(&mut self, class: Class, proto: Option<Value>) -> Value {
        let ty = match class {
            Class::Function(_) => Type::Function,
            _ => Type::Object,
        };
        self.push(
            Slot::Object(Object {
                class,
                props: BTreeMap::new(),
                proto,
            }),
            ty,
        )
    }

    /// Allocates a function object with its own `prototype` object.
    pub(crate) fn alloc_function(&mut self, name: &str, callable: Callable) -> Value {
        let function_proto = self.intrinsics.map(|i| i.function_proto);
        let function = self.alloc_object(Class::Function(callable), function_proto);
        let prototype_proto = self.intrinsics.map(|i| i.object_proto);
        let prototype = self.alloc_object(Class::Plain, prototype_proto);
        let name = self.alloc_string(name);
        self.define(function, "prototype", prototype);
        self.define(function, "name", name);
        function
    }

    pub(crate) fn alloc_error(&mut self, kind: ErrorKind, message: &str) -> Value {
        let intrinsics = self.intrinsics();
        let proto = match kind {
            ErrorKind::Error => intrinsics.error_proto,
            ErrorKind::TypeError => intrinsics.type_error_proto,
            ErrorKind::RangeError => intrinsics.range_error_proto,
        };
        let error = self.alloc_object(Class::Plain, Some(proto));
        let message = self.alloc_string(message);
        self.define(error, "message", message);
        error
    }

    fn check(&self, r: Ref) -> usize {
        if r.realm != self.id {
            panic!("host value used outside the thread that created it");
        }
        r.index as usize
    }

    pub(crate) fn owns(&self, r: Ref) -> bool {
        r.realm == self.id
    }

    pub(crate) fn slot(&self, r: Ref) -> &Slot {
        let index = self.check(r);
        &self.slots[index]
    }

    pub(crate) fn object(&self, r: Ref) -> Option<&Object> {
        match self.slot(r) {
            Slot::Object(object) => Some(object),
            _ => None,
        }
    }

    pub(crate) fn object_mut(&mut self, r: Ref) -> Option<&mut Object> {
        let index = self.check(r);
        match &mut self.slots[index] {
            Slot::Object(object) => Some(object),
            _ => None,
        }
    }

    pub(crate) fn string(&self, r: Ref) -> Option<Rc<str>> {
        match self.slot(r) {
            Slot::String(s) => Some(Rc::clone(s)),
            _ => None,
        }
    }

    /// Defines an own property, bypassing array and byte-array semantics.
    pub(crate) fn define(&mut self, target: Value, key: &str, value: Value) {
        if let Some(object) = target.heap_ref().and_then(|r| self.object_mut(r)) {
            object.props.insert(key.to_string(), value);
        }
    }

    /// Property lookup through own properties, then the prototype chain.
    pub(crate) fn get_property(&self, r: Ref, key: &str) -> Value {
        let mut current = Some(r);
        while let Some(r) = current {
            let Some(object) = self.object(r) else {
                return Value::undefined();
            };
            if let Some(value) = own_element(object, key) {
                return match value {
                    Element::Value(value) => value,
                    Element::Number(n) => Value::number(n),
                };
            }
            if let Some(value) = object.props.get(key) {
                return *value;
            }
            current = object.proto.and_then(|p| p.heap_ref());
        }
        Value::undefined()
    }

    pub(crate) fn set_property(&mut self, r: Ref, key: &str, value: Value) {
        let number = value.as_number();
        let Some(object) = self.object_mut(r) else {
            return;
        };
        match &mut object.class {
            Class::Array(items) => {
                if key == "length" {
                    if let Some(len) = number.filter(|n| n.fract() == 0.0 && *n >= 0.0) {
                        items.resize(len as usize, Value::undefined());
                        return;
                    }
                } else if let Ok(index) = key.parse::<usize>() {
                    if index >= items.len() {
                        items.resize(index + 1, Value::undefined());
                    }
                    items[index] = value;
                    return;
                }
            }
            Class::Bytes { data, clamped } => {
                if let Ok(index) = key.parse::<usize>() {
                    if let Some(byte) = data.get_mut(index) {
                        *byte = to_byte(number.unwrap_or(0.0), *clamped);
                    }
                    return;
                }
            }
            _ => {}
        }
        object.props.insert(key.to_string(), value);
    }

    pub(crate) fn delete_property(&mut self, r: Ref, key: &str) {
        let Some(object) = self.object_mut(r) else {
            return;
        };
        if let Class::Array(items) = &mut object.class {
            if let Some(slot) = key.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *slot = Value::undefined();
                return;
            }
        }
        object.props.remove(key);
    }

    pub(crate) fn bytes_mut(&mut self, r: Ref) -> Option<&mut Vec<u8>> {
        match &mut self.object_mut(r)?.class {
            Class::Bytes { data, .. } => Some(data),
            _ => None,
        }
    }

    pub(crate) fn array_mut(&mut self, r: Ref) -> Option<&mut Vec<Value>> {
        match &mut self.object_mut(r)?.class {
            Class::Array(items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn register_callback(&mut self, callback: Rc<Callback>) -> u32 {
        let id = self.next_callback;
        self.next_callback = self
            .next_callback
            .checked_add(1)
            .unwrap_or_else(|| panic!("func_of: too many registered callbacks"));
        self.callbacks.insert(id, callback);
        id
    }

    pub(crate) fn release_callback(&mut self, id: u32) {
        self.callbacks.remove(&id);
    }

    pub(crate) fn is_registered(&self, id: u32) -> bool {
        self.callbacks.contains_key(&id)
    }

    fn invocable(&self, r: Ref) -> Option<Invocable> {
        match self.object(r)?.class {
            Class::Function(Callable::Builtin(f)) => Some(Invocable::Builtin(f)),
            Class::Function(Callable::Callback(id)) => {
                Some(Invocable::Callback(self.callbacks.get(&id).cloned()))
            }
            _ => None,
        }
    }
}

enum Element {
    Value(Value),
    Number(f64),
}

fn own_element(object: &Object, key: &str) -> Option<Element> {
    match &object.class {
        Class::Array(items) => {
            if key == "length" {
                return Some(Element::Number(items.len() as f64));
            }
            let index = key.parse::<usize>().ok()?;
            items.get(index).copied().map(Element::Value)
        }
        Class::Bytes { data, .. } => {
            if key == "length" || key == "byteLength" {
                return Some(Element::Number(data.len() as f64));
            }
            let index = key.parse::<usize>().ok()?;
            data.get(index).map(|b| Element::Number(f64::from(*b)))
        }
        _ => None,
    }
}

pub(crate) fn to_byte(n: f64, clamped: bool) -> u8 {
    if n.is_nan() {
        return 0;
    }
    if clamped {
        return n.round().clamp(0.0, 255.0) as u8;
    }
    (n.trunc().rem_euclid(256.0)) as u8
}

/// Runs `f` against this thread's realm.
pub(crate) fn with<R>(f: impl FnOnce(&mut Realm) -> R) -> R {
    REALM.with(|realm| f(&mut realm.borrow_mut()))
}

/// Like [`with`], but never panics: `None` when the realm is unavailable
/// (thread teardown or re-entrant borrow).
pub(crate) fn try_with<R>(f: impl FnOnce(&mut Realm) -> R) -> Option<R> {
    REALM
        .try_with(|realm| realm.try_borrow_mut().ok().map(|mut realm| f(&mut realm)))
        .ok()
        .flatten()
}

pub(crate) fn new_error(kind: ErrorKind, message: &str) -> Value {
    with(|realm| realm.alloc_error(kind, message))
}

/// Applies a host function. `Err` carries the value the host threw.
pub(crate) fn apply(
    function: Value,
    this: Value,
    args: &[Value],
    construct: bool,
) -> Result<Value, Value> {
    let invocable = function
        .heap_ref()
        .and_then(|r| with(|realm| realm.invocable(r)));
    match invocable {
        None => Err(new_error(
            ErrorKind::TypeError,
            &format!("{} is not a function", function.type_of()),
        )),
        Some(Invocable::Builtin(f)) => f(this, args, construct),
        Some(Invocable::Callback(None)) => Err(new_error(
            ErrorKind::Error,
            "call to released function",
        )),
        Some(Invocable::Callback(Some(callback))) => {
            if !construct {
                return Ok(super::value_of(callback(this, args)));
            }
            let instance = with(|realm| {
                let proto = function
                    .heap_ref()
                    .map(|r| realm.get_property(r, "prototype"))
                    .filter(|p| p.type_of().is_object())
                    .unwrap_or(realm.intrinsics().object_proto);
                realm.alloc_object(Class::Plain, Some(proto))
            });
            let result = super::value_of(callback(instance, args));
            if result.type_of().is_object() {
                Ok(result)
            } else {
                Ok(instance)
            }
        }
    }
}
