use crate::raw;
use crate::value::Value;

/// The host's global object. Never fails.
pub fn global() -> Value {
    Value::from_raw(raw::global())
}

/// The host `null`. Never fails.
pub fn null() -> Value {
    Value::from_raw(raw::null())
}

/// The host `undefined`. Never fails.
pub fn undefined() -> Value {
    Value::from_raw(raw::undefined())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Type;

    #[test]
    fn test_constants() {
        assert!(null().is_null());
        assert!(undefined().is_undefined());
        assert_eq!(global().type_of(), Type::Object);
        assert!(global().get("Array").unwrap().type_of() == Type::Function);
    }
}
