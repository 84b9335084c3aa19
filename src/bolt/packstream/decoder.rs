//! PackStream decoder.

use bytes::Buf;
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStruct, PackValue};
use super::PackError;

/// Reads PackStream values from a byte slice.
///
/// The reader accepts any encoding of a value, not only the smallest
/// one, so `CB 00 ... 01` and `01` both decode to the integer 1.
pub struct PackReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Decode the next value.
    pub fn read(&mut self) -> Result<PackValue, PackError> {
        let marker = self.take_u8()?;

        if is_tiny_string(marker) {
            let len = tiny_string_len(marker);
            return self.read_string_payload(len);
        }
        if is_tiny_list(marker) {
            let len = tiny_list_len(marker);
            return self.read_list_payload(len);
        }
        if is_tiny_map(marker) {
            let len = tiny_map_len(marker);
            return self.read_map_payload(len);
        }
        if is_tiny_struct(marker) {
            let len = tiny_struct_fields(marker);
            return self.read_struct_payload(len);
        }

        match marker {
            NULL => Ok(PackValue::Null),
            TRUE => Ok(PackValue::Boolean(true)),
            FALSE => Ok(PackValue::Boolean(false)),
            FLOAT_64 => Ok(PackValue::Float(self.take_f64()?)),

            INT_8 => Ok(PackValue::Integer(self.take_u8()? as i8 as i64)),
            INT_16 => Ok(PackValue::Integer(self.take_i16()? as i64)),
            INT_32 => Ok(PackValue::Integer(self.take_i32()? as i64)),
            INT_64 => Ok(PackValue::Integer(self.take_i64()?)),

            BYTES_8 => {
                let len = self.take_u8()? as usize;
                self.read_bytes_payload(len)
            }
            BYTES_16 => {
                let len = self.take_u16()? as usize;
                self.read_bytes_payload(len)
            }
            BYTES_32 => {
                let len = self.take_u32()? as usize;
                self.read_bytes_payload(len)
            }

            STRING_8 => {
                let len = self.take_u8()? as usize;
                self.read_string_payload(len)
            }
            STRING_16 => {
                let len = self.take_u16()? as usize;
                self.read_string_payload(len)
            }
            STRING_32 => {
                let len = self.take_u32()? as usize;
                self.read_string_payload(len)
            }

            LIST_8 => {
                let len = self.take_u8()? as usize;
                self.read_list_payload(len)
            }
            LIST_16 => {
                let len = self.take_u16()? as usize;
                self.read_list_payload(len)
            }
            LIST_32 => {
                let len = self.take_u32()? as usize;
                self.read_list_payload(len)
            }

            MAP_8 => {
                let len = self.take_u8()? as usize;
                self.read_map_payload(len)
            }
            MAP_16 => {
                let len = self.take_u16()? as usize;
                self.read_map_payload(len)
            }
            MAP_32 => {
                let len = self.take_u32()? as usize;
                self.read_map_payload(len)
            }

            STRUCT_8 => {
                let len = self.take_u8()? as usize;
                self.read_struct_payload(len)
            }
            STRUCT_16 => {
                let len = self.take_u16()? as usize;
                self.read_struct_payload(len)
            }

            _ if is_tiny_int(marker) => Ok(PackValue::Integer(tiny_int_value(marker) as i64)),

            _ => Err(PackError::UnknownMarker(marker)),
        }
    }

    fn read_bytes_payload(&mut self, len: usize) -> Result<PackValue, PackError> {
        let bytes = self.take_slice(len)?;
        Ok(PackValue::Bytes(bytes.to_vec()))
    }

    fn read_string_payload(&mut self, len: usize) -> Result<PackValue, PackError> {
        let bytes = self.take_slice(len)?;
        let s = std::str::from_utf8(bytes).map_err(|e| PackError::InvalidUtf8(e.to_string()))?;
        Ok(PackValue::String(s.to_string()))
    }

    fn read_list_payload(&mut self, len: usize) -> Result<PackValue, PackError> {
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.read()?);
        }
        Ok(PackValue::List(items))
    }

    /// Keys must be strings; a repeated key is an error.
    fn read_map_payload(&mut self, len: usize) -> Result<PackValue, PackError> {
        let mut map = HashMap::with_capacity(len.min(1024));
        for _ in 0..len {
            let key = match self.read()? {
                PackValue::String(s) => s,
                _ => return Err(PackError::InvalidMapKey),
            };
            let value = self.read()?;
            if map.insert(key.clone(), value).is_some() {
                return Err(PackError::DuplicateMapKey(key));
            }
        }
        Ok(PackValue::Map(map))
    }

    fn read_struct_payload(&mut self, field_count: usize) -> Result<PackValue, PackError> {
        let tag = self.take_u8()?;
        let mut fields = Vec::with_capacity(field_count.min(64));
        for _ in 0..field_count {
            fields.push(self.read()?);
        }
        Ok(PackValue::Struct(PackStruct::new(tag, fields)))
    }

    fn take_u8(&mut self) -> Result<u8, PackError> {
        if self.remaining() < 1 {
            return Err(PackError::UnexpectedEof);
        }
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    fn take_u16(&mut self) -> Result<u16, PackError> {
        let mut slice = self.take_slice(2)?;
        Ok(slice.get_u16())
    }

    fn take_i16(&mut self) -> Result<i16, PackError> {
        let mut slice = self.take_slice(2)?;
        Ok(slice.get_i16())
    }

    fn take_u32(&mut self) -> Result<u32, PackError> {
        let mut slice = self.take_slice(4)?;
        Ok(slice.get_u32())
    }

    fn take_i32(&mut self) -> Result<i32, PackError> {
        let mut slice = self.take_slice(4)?;
        Ok(slice.get_i32())
    }

    fn take_i64(&mut self) -> Result<i64, PackError> {
        let mut slice = self.take_slice(8)?;
        Ok(slice.get_i64())
    }

    fn take_f64(&mut self) -> Result<f64, PackError> {
        let mut slice = self.take_slice(8)?;
        Ok(slice.get_f64())
    }

    fn take_slice(&mut self, len: usize) -> Result<&'a [u8], PackError> {
        if self.remaining() < len {
            return Err(PackError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

/// Decode a single value from a byte slice.
pub fn decode(data: &[u8]) -> Result<PackValue, PackError> {
    let mut reader = PackReader::new(data);
    reader.read()
}
