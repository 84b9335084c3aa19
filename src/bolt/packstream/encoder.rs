//! PackStream encoder.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStruct, PackValue};
use super::PackError;

/// Writes PackStream values into a growable byte buffer.
///
/// The buffer is scoped to one message; callers take it with
/// [`PackWriter::into_bytes`] and hand it to the chunk framer.
pub struct PackWriter {
    buffer: BytesMut,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buffer
    }

    /// Write one value of any kind.
    pub fn write(&mut self, value: &PackValue) -> Result<(), PackError> {
        match value {
            PackValue::Null => {
                self.write_null();
                Ok(())
            }
            PackValue::Boolean(b) => {
                self.write_bool(*b);
                Ok(())
            }
            PackValue::Integer(i) => {
                self.write_int(*i);
                Ok(())
            }
            PackValue::Float(f) => {
                self.write_float(*f);
                Ok(())
            }
            PackValue::Bytes(b) => self.write_bytes(b),
            PackValue::String(s) => self.write_string(s),
            PackValue::List(l) => self.write_list(l),
            PackValue::Map(m) => self.write_map(m),
            PackValue::Struct(s) => self.write_struct(s),
        }
    }

    pub fn write_null(&mut self) {
        self.buffer.put_u8(NULL);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.put_u8(if value { TRUE } else { FALSE });
    }

    /// Integers use the smallest encoding that fits the value.
    pub fn write_int(&mut self, value: i64) {
        if fits_tiny_int(value) {
            self.buffer.put_u8(value as u8);
        } else if i8::try_from(value).is_ok() {
            self.buffer.put_u8(INT_8);
            self.buffer.put_i8(value as i8);
        } else if i16::try_from(value).is_ok() {
            self.buffer.put_u8(INT_16);
            self.buffer.put_i16(value as i16);
        } else if i32::try_from(value).is_ok() {
            self.buffer.put_u8(INT_32);
            self.buffer.put_i32(value as i32);
        } else {
            self.buffer.put_u8(INT_64);
            self.buffer.put_i64(value);
        }
    }

    pub fn write_float(&mut self, value: f64) {
        self.buffer.put_u8(FLOAT_64);
        self.buffer.put_f64(value);
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), PackError> {
        let len = value.len();
        if len > u32::MAX as usize {
            return Err(PackError::ValueTooLarge("bytes", len));
        }

        if len <= u8::MAX as usize {
            self.buffer.put_u8(BYTES_8);
            self.buffer.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.put_u8(BYTES_16);
            self.buffer.put_u16(len as u16);
        } else {
            self.buffer.put_u8(BYTES_32);
            self.buffer.put_u32(len as u32);
        }

        self.buffer.put_slice(value);
        Ok(())
    }

    /// String length is measured in UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) -> Result<(), PackError> {
        let bytes = value.as_bytes();
        let len = bytes.len();
        if len > u32::MAX as usize {
            return Err(PackError::ValueTooLarge("string", len));
        }

        if len <= TINY_STRING_MAX_LEN {
            self.buffer.put_u8(TINY_STRING_BASE + len as u8);
        } else if len <= u8::MAX as usize {
            self.buffer.put_u8(STRING_8);
            self.buffer.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.put_u8(STRING_16);
            self.buffer.put_u16(len as u16);
        } else {
            self.buffer.put_u8(STRING_32);
            self.buffer.put_u32(len as u32);
        }

        self.buffer.put_slice(bytes);
        Ok(())
    }

    pub fn write_list(&mut self, values: &[PackValue]) -> Result<(), PackError> {
        let len = values.len();
        if len > u32::MAX as usize {
            return Err(PackError::ValueTooLarge("list", len));
        }

        if len <= TINY_LIST_MAX_LEN {
            self.buffer.put_u8(TINY_LIST_BASE + len as u8);
        } else if len <= u8::MAX as usize {
            self.buffer.put_u8(LIST_8);
            self.buffer.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.put_u8(LIST_16);
            self.buffer.put_u16(len as u16);
        } else {
            self.buffer.put_u8(LIST_32);
            self.buffer.put_u32(len as u32);
        }

        for value in values {
            self.write(value)?;
        }
        Ok(())
    }

    /// Map entries are written key then value. Key uniqueness is
    /// guaranteed by the `HashMap` representation.
    pub fn write_map(&mut self, map: &HashMap<String, PackValue>) -> Result<(), PackError> {
        let len = map.len();
        if len > u32::MAX as usize {
            return Err(PackError::ValueTooLarge("map", len));
        }

        if len <= TINY_MAP_MAX_LEN {
            self.buffer.put_u8(TINY_MAP_BASE + len as u8);
        } else if len <= u8::MAX as usize {
            self.buffer.put_u8(MAP_8);
            self.buffer.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.put_u8(MAP_16);
            self.buffer.put_u16(len as u16);
        } else {
            self.buffer.put_u8(MAP_32);
            self.buffer.put_u32(len as u32);
        }

        for (key, value) in map {
            self.write_string(key)?;
            self.write(value)?;
        }
        Ok(())
    }

    pub fn write_struct(&mut self, s: &PackStruct) -> Result<(), PackError> {
        let len = s.fields.len();
        if len > u16::MAX as usize {
            return Err(PackError::ValueTooLarge("struct fields", len));
        }

        if len <= TINY_STRUCT_MAX_FIELDS {
            self.buffer.put_u8(TINY_STRUCT_BASE + len as u8);
        } else if len <= u8::MAX as usize {
            self.buffer.put_u8(STRUCT_8);
            self.buffer.put_u8(len as u8);
        } else {
            self.buffer.put_u8(STRUCT_16);
            self.buffer.put_u16(len as u16);
        }

        self.buffer.put_u8(s.tag);
        for field in &s.fields {
            self.write(field)?;
        }
        Ok(())
    }
}

impl Default for PackWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a single value into a fresh buffer.
pub fn encode(value: &PackValue) -> Result<BytesMut, PackError> {
    let mut writer = PackWriter::new();
    writer.write(value)?;
    Ok(writer.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_bool() {
        let mut w = PackWriter::new();
        w.write_null();
        w.write_bool(true);
        w.write_bool(false);
        assert_eq!(w.as_bytes(), &[0xC0, 0xC3, 0xC2]);
    }

    #[test]
    fn smallest_int_encodings() {
        // The canonical witness values: one per encoding width.
        let cases: &[(i64, &[u8])] = &[
            (0, &[0x00]),
            (127, &[0x7F]),
            (-1, &[0xFF]),
            (-16, &[0xF0]),
            (-17, &[0xC8, 0xEF]),
            (-128, &[0xC8, 0x80]),
            (128, &[0xC9, 0x00, 0x80]),
            (200, &[0xC9, 0x00, 0xC8]),
            (-129, &[0xC9, 0xFF, 0x7F]),
            (32767, &[0xC9, 0x7F, 0xFF]),
            (70000, &[0xCA, 0x00, 0x01, 0x11, 0x70]),
            (-40000, &[0xCA, 0xFF, 0xFF, 0x63, 0xC0]),
            (
                i64::MAX,
                &[0xCB, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
            ),
            (
                i64::MIN,
                &[0xCB, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
            ),
        ];
        for (value, expected) in cases {
            let mut w = PackWriter::new();
            w.write_int(*value);
            assert_eq!(w.as_bytes(), *expected, "value {}", value);
        }
    }

    #[test]
    fn float_is_nine_bytes() {
        let mut w = PackWriter::new();
        w.write_float(1.25);
        let bytes = w.as_bytes();
        assert_eq!(bytes[0], 0xC1);
        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[1..], 1.25f64.to_be_bytes());
    }

    #[test]
    fn string_forms() {
        let mut w = PackWriter::new();
        w.write_string("hello").unwrap();
        assert_eq!(w.as_bytes()[0], 0x85);
        assert_eq!(&w.as_bytes()[1..], b"hello");

        let mut w = PackWriter::new();
        w.write_string("").unwrap();
        assert_eq!(w.as_bytes(), &[0x80]);

        let s = "a".repeat(16);
        let mut w = PackWriter::new();
        w.write_string(&s).unwrap();
        assert_eq!(w.as_bytes()[0], STRING_8);
        assert_eq!(w.as_bytes()[1], 16);

        let s = "b".repeat(256);
        let mut w = PackWriter::new();
        w.write_string(&s).unwrap();
        assert_eq!(w.as_bytes()[0], STRING_16);

        let s = "c".repeat(70_000);
        let mut w = PackWriter::new();
        w.write_string(&s).unwrap();
        assert_eq!(w.as_bytes()[0], STRING_32);
    }

    #[test]
    fn string_length_in_bytes_not_chars() {
        // Two characters, five UTF-8 bytes.
        let mut w = PackWriter::new();
        w.write_string("é\u{1F600}").unwrap();
        assert_eq!(w.as_bytes()[0], TINY_STRING_BASE + 6);
    }

    #[test]
    fn bytes_forms() {
        let mut w = PackWriter::new();
        w.write_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(w.as_bytes(), &[0xCC, 0x03, 1, 2, 3]);

        let mut w = PackWriter::new();
        w.write_bytes(&[0u8; 256]).unwrap();
        assert_eq!(w.as_bytes()[0], BYTES_16);

        let mut w = PackWriter::new();
        w.write_bytes(&[0u8; 70_000]).unwrap();
        assert_eq!(w.as_bytes()[0], BYTES_32);
    }

    #[test]
    fn list_forms() {
        let mut w = PackWriter::new();
        w.write_list(&[]).unwrap();
        assert_eq!(w.as_bytes(), &[0x90]);

        let three: Vec<PackValue> = (1..=3).map(PackValue::Integer).collect();
        let mut w = PackWriter::new();
        w.write_list(&three).unwrap();
        assert_eq!(w.as_bytes(), &[0x93, 1, 2, 3]);

        let long: Vec<PackValue> = (0..16).map(PackValue::Integer).collect();
        let mut w = PackWriter::new();
        w.write_list(&long).unwrap();
        assert_eq!(w.as_bytes()[0], LIST_8);
        assert_eq!(w.as_bytes()[1], 16);
    }

    #[test]
    fn map_forms() {
        let mut w = PackWriter::new();
        w.write_map(&HashMap::new()).unwrap();
        assert_eq!(w.as_bytes(), &[0xA0]);

        let mut map = HashMap::new();
        map.insert("a".to_string(), PackValue::Integer(1));
        let mut w = PackWriter::new();
        w.write_map(&map).unwrap();
        assert_eq!(w.as_bytes(), &[0xA1, 0x81, b'a', 0x01]);
    }

    #[test]
    fn struct_header() {
        let s = PackStruct::new(0x4E, vec![PackValue::Integer(1)]);
        let mut w = PackWriter::new();
        w.write_struct(&s).unwrap();
        assert_eq!(w.as_bytes(), &[0xB1, 0x4E, 0x01]);
    }

    #[test]
    fn encode_helper() {
        let bytes = encode(&PackValue::String("test".into())).unwrap();
        assert_eq!(&bytes[..], &[0x84, b't', b'e', b's', b't']);
    }
}
