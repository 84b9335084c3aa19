//! PackStream: the self-describing binary value encoding used by the
//! Bolt protocol.
//!
//! Each value starts with a marker byte (see [`marker`]) describing its
//! type and, for small forms, its length. Supported kinds: null,
//! booleans, signed 64-bit integers, IEEE 754 doubles, UTF-8 strings,
//! byte arrays, lists, maps with unique string keys, and tagged structs.
//!
//! Integers are always written in the smallest encoding that fits the
//! value; the reader accepts any representation of the same value.
//!
//! Struct tags for the graph, spatial and temporal domain values live in
//! [`registry`] together with the per-tag field-count contract.

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod registry;
pub mod structures;
pub mod types;

pub use decoder::{decode, PackReader};
pub use encoder::{encode, PackWriter};
pub use registry::{handler_for_tag, handler_for_value, StructHandler};
pub use types::{PackStruct, PackValue};

use std::fmt;

/// Codec-level errors. All of these are fatal to the current message and
/// to the connection that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum PackError {
    /// Input ended inside a value
    UnexpectedEof,
    /// Marker byte does not start any known value kind
    UnknownMarker(u8),
    /// String payload is not valid UTF-8
    InvalidUtf8(String),
    /// Map key was not a string
    InvalidMapKey,
    /// The same key appeared twice in one map
    DuplicateMapKey(String),
    /// Value exceeds what its length field can express
    ValueTooLarge(&'static str, usize),
    /// Struct tag unknown or field count does not match the tag's arity
    InvalidStruct(String),
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackError::UnexpectedEof => write!(f, "unexpected end of PackStream data"),
            PackError::UnknownMarker(m) => write!(f, "unknown PackStream marker 0x{:02X}", m),
            PackError::InvalidUtf8(e) => write!(f, "invalid UTF-8 in string: {}", e),
            PackError::InvalidMapKey => write!(f, "map keys must be strings"),
            PackError::DuplicateMapKey(k) => write!(f, "duplicate map key: {:?}", k),
            PackError::ValueTooLarge(kind, len) => write!(f, "{} too large: {} bytes", kind, len),
            PackError::InvalidStruct(msg) => write!(f, "invalid struct: {}", msg),
        }
    }
}

impl std::error::Error for PackError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn roundtrip(value: &PackValue) -> PackValue {
        let bytes = encode(value).unwrap();
        decode(&bytes).unwrap()
    }

    #[test]
    fn roundtrip_null_and_bool() {
        assert_eq!(roundtrip(&PackValue::Null), PackValue::Null);
        for v in [true, false] {
            assert_eq!(roundtrip(&PackValue::Boolean(v)), PackValue::Boolean(v));
        }
    }

    #[test]
    fn roundtrip_integers() {
        for v in [
            0i64,
            1,
            -1,
            127,
            -16,
            -17,
            128,
            -128,
            200,
            32767,
            -32768,
            70000,
            i32::MAX as i64,
            i32::MIN as i64,
            i64::MAX,
            i64::MIN,
        ] {
            assert_eq!(roundtrip(&PackValue::Integer(v)), PackValue::Integer(v), "value {}", v);
        }
    }

    #[test]
    fn roundtrip_floats_bit_exact() {
        for v in [0.0f64, -0.0, 1.5, -1.5, f64::MAX, f64::MIN, f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let decoded = roundtrip(&PackValue::Float(v));
            match decoded {
                PackValue::Float(d) => assert_eq!(d.to_bits(), v.to_bits(), "value {}", v),
                other => panic!("expected float, got {:?}", other),
            }
        }
    }

    #[test]
    fn roundtrip_strings() {
        for s in [
            "",
            "a",
            "fifteen chars..",
            "sixteen chars...",
            &"x".repeat(300),
            &"y".repeat(70_000),
            "héllo wörld",
            "\u{10FFFF}\u{1F600}",
        ] {
            assert_eq!(
                roundtrip(&PackValue::String(s.to_string())),
                PackValue::String(s.to_string())
            );
        }
    }

    #[test]
    fn roundtrip_bytes() {
        for b in [vec![], vec![0u8], vec![1, 2, 3], vec![0xAB; 300], vec![0xCD; 70_000]] {
            assert_eq!(roundtrip(&PackValue::Bytes(b.clone())), PackValue::Bytes(b));
        }
    }

    #[test]
    fn roundtrip_lists() {
        assert_eq!(roundtrip(&PackValue::List(vec![])), PackValue::List(vec![]));

        let one = PackValue::List(vec![PackValue::Integer(1)]);
        assert_eq!(roundtrip(&one), one);

        let mixed = PackValue::List(vec![
            PackValue::Integer(1),
            PackValue::String("two".into()),
            PackValue::Boolean(true),
            PackValue::Null,
            PackValue::List(vec![PackValue::Float(2.5)]),
        ]);
        assert_eq!(roundtrip(&mixed), mixed);

        let long = PackValue::List((0..300).map(PackValue::Integer).collect());
        assert_eq!(roundtrip(&long), long);
    }

    #[test]
    fn roundtrip_maps() {
        assert_eq!(
            roundtrip(&PackValue::Map(HashMap::new())),
            PackValue::Map(HashMap::new())
        );

        let mut map = HashMap::new();
        map.insert("a".to_string(), PackValue::Integer(1));
        map.insert("b".to_string(), PackValue::String("two".into()));
        map.insert("c".to_string(), PackValue::Null);
        let value = PackValue::Map(map);
        assert_eq!(roundtrip(&value), value);

        let big: HashMap<String, PackValue> =
            (0..40).map(|i| (format!("k{}", i), PackValue::Integer(i))).collect();
        let value = PackValue::Map(big);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn roundtrip_struct() {
        let s = PackStruct::new(
            0x4E,
            vec![
                PackValue::Integer(1),
                PackValue::List(vec![PackValue::String("Person".into())]),
                PackValue::Map(HashMap::new()),
            ],
        );
        let value = PackValue::Struct(s);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn deeply_nested() {
        let mut inner = HashMap::new();
        inner.insert(
            "items".to_string(),
            PackValue::List(vec![PackValue::Integer(1), PackValue::Integer(2)]),
        );
        let value = PackValue::List(vec![
            PackValue::Map(inner.clone()),
            PackValue::Map(inner),
        ]);
        assert_eq!(roundtrip(&value), value);
    }
}
