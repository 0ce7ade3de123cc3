use serde::{Serialize, de::DeserializeOwned};

use crate::error::WireError;

/// The pluggable codec boundary (C2, spec.md §4.2): `encode`/`decode` for
/// any value the two ends agree to exchange. The concrete serialiser
/// plugged in here is `bitcode` (already part of the teacher's dependency
/// stack), used the same way the teacher wraps `wincode`'s schema derive
/// with a couple of free functions rather than exposing the serialiser's
/// own API at every call site.
///
/// A single codec type is enough here (unlike `processional`'s full/plain
/// split, spec.md §4.2) because this rendition never ships a captured
/// closure: every payload shape is already restricted to plain, `Serialize`
/// values (SPEC_FULL.md §1 addendum), so there is nothing a "full" codec
/// could do that this one cannot decode.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    bitcode::serialize(value).map_err(WireError::Serialization)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    bitcode::deserialize(bytes).map_err(WireError::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn round_trips_a_nested_value() {
        let v = Value::List(vec![
            Value::Int(1),
            Value::Str("two".into()),
            Value::Map(vec![(Value::Str("k".into()), Value::Bool(true))]),
        ]);
        let bytes = encode(&v).unwrap();
        let back: Value = decode(&bytes).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn decode_of_garbage_is_a_serialization_error() {
        let err = decode::<Value>(&[0xff, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, WireError::Serialization(_)));
    }
}
