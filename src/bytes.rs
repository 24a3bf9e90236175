//! Byte copies between Rust slices and host byte arrays.

use crate::catch;
use crate::error::Result;
use crate::raw;
use crate::value::Value;

/// Copies bytes from the host `Uint8Array` or `Uint8ClampedArray` `src`
/// into `dst`. Returns the number of bytes copied, the shorter of the two
/// lengths.
pub fn copy_bytes_to_rust(dst: &mut [u8], src: &Value) -> Result<usize> {
    let src = src.into_raw();
    catch::attempt(move || raw::copy_bytes_to_rust(dst, src))
}

/// Copies `src` into the host `Uint8Array` or `Uint8ClampedArray` `dst`.
/// Returns the number of bytes copied, the shorter of the two lengths.
pub fn copy_bytes_to_js(dst: &Value, src: &[u8]) -> Result<usize> {
    let dst = dst.into_raw();
    catch::attempt(move || raw::copy_bytes_to_js(dst, src))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{global, value_of, Native};

    fn uint8_array(len: usize) -> Value {
        global()
            .get("Uint8Array")
            .unwrap()
            .new(&[Native::from(len)])
            .unwrap()
    }

    #[test]
    fn test_copy_round_trip() {
        let array = uint8_array(4);
        assert_eq!(copy_bytes_to_js(&array, &[1, 2, 3, 4, 5]).unwrap(), 4);

        let mut out = [0u8; 8];
        assert_eq!(copy_bytes_to_rust(&mut out, &array).unwrap(), 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
        assert_eq!(array.index(3).unwrap().int().unwrap(), 4);
    }

    #[test]
    fn test_copy_from_clamped_array() {
        let array = global()
            .get("Uint8ClampedArray")
            .unwrap()
            .new(&[Native::from(2)])
            .unwrap();
        copy_bytes_to_js(&array, &[9, 8]).unwrap();
        let mut out = [0u8; 1];
        assert_eq!(copy_bytes_to_rust(&mut out, &array).unwrap(), 1);
        assert_eq!(out, [9]);
    }

    #[test]
    fn test_copy_wrong_type() {
        let not_bytes = value_of("abc").unwrap();
        let mut out = [0u8; 3];
        assert_eq!(
            copy_bytes_to_rust(&mut out, &not_bytes).unwrap_err().to_string(),
            "copy_bytes_to_rust: expected src to be an Uint8Array or Uint8ClampedArray"
        );
        assert_eq!(
            copy_bytes_to_js(&not_bytes, &out).unwrap_err().to_string(),
            "copy_bytes_to_js: expected dst to be an Uint8Array or Uint8ClampedArray"
        );
    }
}
