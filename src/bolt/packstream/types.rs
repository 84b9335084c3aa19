//! PackStream wire value types.

use std::collections::HashMap;

/// A value as it travels on the wire.
///
/// This is the codec-level representation; the driver-level
/// [`Value`](crate::driver::Value) adds decoded graph, spatial and
/// temporal types on top via the struct registry.
#[derive(Debug, Clone, PartialEq)]
pub enum PackValue {
    /// Absent value
    Null,
    /// Boolean
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit IEEE 754 float
    Float(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Ordered list of values
    List(Vec<PackValue>),
    /// Association from string keys to values; keys unique
    Map(HashMap<String, PackValue>),
    /// Tagged struct
    Struct(PackStruct),
}

/// A tagged struct: one tag byte plus an ordered field list.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStruct {
    /// Tag byte identifying the struct kind
    pub tag: u8,
    /// Ordered fields
    pub fields: Vec<PackValue>,
}

impl PackStruct {
    pub fn new(tag: u8, fields: Vec<PackValue>) -> Self {
        Self { tag, fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field at `index`, if present.
    pub fn field(&self, index: usize) -> Option<&PackValue> {
        self.fields.get(index)
    }
}

impl PackValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PackValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PackValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PackValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PackValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PackValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PackValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PackValue]> {
        match self {
            PackValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, PackValue>> {
        match self {
            PackValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&PackStruct> {
        match self {
            PackValue::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable kind name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PackValue::Null => "Null",
            PackValue::Boolean(_) => "Boolean",
            PackValue::Integer(_) => "Integer",
            PackValue::Float(_) => "Float",
            PackValue::Bytes(_) => "Bytes",
            PackValue::String(_) => "String",
            PackValue::List(_) => "List",
            PackValue::Map(_) => "Map",
            PackValue::Struct(_) => "Struct",
        }
    }
}

impl From<bool> for PackValue {
    fn from(v: bool) -> Self {
        PackValue::Boolean(v)
    }
}

impl From<i64> for PackValue {
    fn from(v: i64) -> Self {
        PackValue::Integer(v)
    }
}

impl From<i32> for PackValue {
    fn from(v: i32) -> Self {
        PackValue::Integer(v as i64)
    }
}

impl From<f64> for PackValue {
    fn from(v: f64) -> Self {
        PackValue::Float(v)
    }
}

impl From<&str> for PackValue {
    fn from(v: &str) -> Self {
        PackValue::String(v.to_string())
    }
}

impl From<String> for PackValue {
    fn from(v: String) -> Self {
        PackValue::String(v)
    }
}

impl From<Vec<u8>> for PackValue {
    fn from(v: Vec<u8>) -> Self {
        PackValue::Bytes(v)
    }
}

impl From<Vec<PackValue>> for PackValue {
    fn from(v: Vec<PackValue>) -> Self {
        PackValue::List(v)
    }
}

impl From<HashMap<String, PackValue>> for PackValue {
    fn from(v: HashMap<String, PackValue>) -> Self {
        PackValue::Map(v)
    }
}

impl From<PackStruct> for PackValue {
    fn from(v: PackStruct) -> Self {
        PackValue::Struct(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        assert!(PackValue::Null.is_null());
        assert_eq!(PackValue::Boolean(true).as_bool(), Some(true));
        assert_eq!(PackValue::Integer(7).as_int(), Some(7));
        assert_eq!(PackValue::Float(1.5).as_float(), Some(1.5));
        assert_eq!(PackValue::Integer(7).as_float(), None);
        assert_eq!(PackValue::from("hi").as_str(), Some("hi"));
        assert_eq!(PackValue::from(vec![1u8, 2]).as_bytes(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn struct_fields() {
        let s = PackStruct::new(0x4E, vec![PackValue::Integer(1), PackValue::Null]);
        assert_eq!(s.len(), 2);
        assert!(!s.is_empty());
        assert_eq!(s.field(0).and_then(PackValue::as_int), Some(1));
        assert!(s.field(2).is_none());

        let v = PackValue::Struct(s);
        assert!(v.as_struct().is_some());
        assert_eq!(v.kind(), "Struct");
    }

    #[test]
    fn from_conversions() {
        let _: PackValue = true.into();
        let _: PackValue = 1i64.into();
        let _: PackValue = 1i32.into();
        let _: PackValue = 1.0f64.into();
        let _: PackValue = "s".into();
        let _: PackValue = String::from("s").into();
        let _: PackValue = vec![0u8].into();
    }
}
