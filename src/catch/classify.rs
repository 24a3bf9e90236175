//! Turning a recovered panic payload into an [`Error`].

use crate::error::{Error, HostError};
use crate::{raw, Value};
use std::any::Any;
use std::sync::Arc;

type Payload = Box<dyn Any + Send>;

/// Classifies a recovered panic payload.
///
/// - no payload, or a unit `()` payload: `None`;
/// - an [`Error`], a [`raw::ValueError`], a boxed `std::error::Error` or an
///   `anyhow::Error`: passed through;
/// - a host exception ([`raw::Error`]) or a bare host value: wrapped in a
///   [`HostError`] whose message is computed on first display;
/// - anything else: [`Error::Panic`] with the payload rendered as text.
///
/// Classification never panics and never calls into the host.
pub fn classify(payload: Option<Payload>) -> Option<Error> {
    let payload = payload?;
    if payload.is::<()>() {
        return None;
    }
    let payload = match typed_error(payload) {
        Ok(error) => return Some(error),
        Err(payload) => payload,
    };
    let payload = match host_error(payload) {
        Ok(error) => return Some(Error::Host(error)),
        Err(payload) => payload,
    };
    Some(Error::Panic(describe(payload.as_ref())))
}

fn typed_error(payload: Payload) -> Result<Error, Payload> {
    let payload = match payload.downcast::<Error>() {
        Ok(error) => return Ok(*error),
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<raw::ValueError>() {
        Ok(error) => return Ok(Error::Value(*error)),
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<Box<dyn std::error::Error + Send + Sync>>() {
        Ok(error) => return Ok(Error::Other(Arc::from(*error))),
        Err(payload) => payload,
    };
    match payload.downcast::<anyhow::Error>() {
        Ok(error) => {
            let boxed: Box<dyn std::error::Error + Send + Sync> = (*error).into();
            Ok(Error::Other(Arc::from(boxed)))
        }
        Err(payload) => Err(payload),
    }
}

fn host_error(payload: Payload) -> Result<HostError, Payload> {
    let payload = match payload.downcast::<raw::Error>() {
        Ok(err) => return Ok(HostError::new(*err)),
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<raw::Value>() {
        Ok(value) => return Ok(HostError::new(raw::Error { value: *value })),
        Err(payload) => payload,
    };
    match payload.downcast::<Value>() {
        Ok(value) => Ok(HostError::new(raw::Error {
            value: (*value).into_raw(),
        })),
        Err(payload) => Err(payload),
    }
}

macro_rules! describe_display {
    ($payload:expr, $($ty:ty),*) => {
        $(if let Some(value) = $payload.downcast_ref::<$ty>() {
            return value.to_string();
        })*
    };
}

/// Default rendering of a payload that is not an error.
fn describe(payload: &(dyn Any + Send)) -> String {
    describe_display!(
        payload, &str, String, Box<str>, std::borrow::Cow<'static, str>, char, bool, i8, i16,
        i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64
    );
    "panic payload of an unprintable type".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn payload<T: Any + Send>(value: T) -> Option<Payload> {
        Some(Box::new(value))
    }

    #[test]
    fn test_no_payload_is_no_error() {
        assert!(classify(None).is_none());
        assert!(classify(payload(())).is_none());
    }

    #[test]
    fn test_strings_and_numbers() {
        assert_eq!(classify(payload("static")).unwrap().to_string(), "static");
        assert_eq!(
            classify(payload(String::from("owned"))).unwrap().to_string(),
            "owned"
        );
        assert_eq!(classify(payload(42u32)).unwrap().to_string(), "42");
        assert_eq!(classify(payload(1.5f64)).unwrap().to_string(), "1.5");
    }

    #[test]
    fn test_opaque_payload() {
        struct Opaque;
        let err = classify(payload(Opaque)).unwrap();
        assert_eq!(err.kind(), ErrorKind::Panic);
        assert_eq!(err.to_string(), "panic payload of an unprintable type");
    }

    #[test]
    fn test_typed_errors_pass_through() {
        let err = classify(payload(raw::ValueError {
            method: "Value.int",
            ty: raw::Type::String,
        }))
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Value);
        assert_eq!(err.to_string(), "call of Value.int on string");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(io);
        let err = classify(payload(boxed)).unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.to_string(), "disk on fire");

        let err = classify(payload(anyhow::anyhow!("from anyhow"))).unwrap();
        assert_eq!(err.to_string(), "from anyhow");
    }

    #[test]
    fn test_host_values_become_host_errors() {
        let err = classify(payload(raw::value_of("not an object"))).unwrap();
        assert_eq!(err.kind(), ErrorKind::Host);
        assert!(err.host_value().is_some());
    }
}
