//! Field types and values.
//!
//! This module defines the closed type system of the engine. [`FieldType`]
//! enumerates the storable column types and [`Field`] holds a single typed
//! value with its fixed-width on-disk serialization.
//!
//! Every type has a fixed byte width, so a tuple's on-disk size is fully
//! determined by its schema. Integers are stored as 4-byte big-endian
//! two's-complement. Text occupies [`STRING_SIZE`] bytes: a 4-byte big-endian
//! content length, the content itself, and zero padding up to the width.

use std::fmt;

use bytes::{Buf, BufMut};

/// On-disk width of a [`FieldType::Text`] field in bytes, including the
/// 4-byte length prefix. The longest storable string is `STRING_SIZE - 4`
/// bytes of UTF-8.
pub const STRING_SIZE: usize = 128;

/// Errors from field serialization/deserialization.
#[derive(Debug)]
pub enum SerializationError {
    /// Text content longer than `STRING_SIZE - 4` bytes.
    TextTooLong {
        /// Content length in bytes.
        length: usize,
    },
    /// The byte image does not decode to a valid field.
    InvalidImage(String),
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::TextTooLong { length } => {
                write!(
                    f,
                    "text of {} bytes exceeds the {}-byte field width",
                    length,
                    STRING_SIZE - 4
                )
            }
            SerializationError::InvalidImage(msg) => {
                write!(f, "invalid field image: {}", msg)
            }
        }
    }
}

impl std::error::Error for SerializationError {}

/// Storable column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 4-byte signed integer.
    Int,
    /// Fixed-width string of [`STRING_SIZE`] bytes.
    Text,
}

impl FieldType {
    /// Returns the on-disk width of a value of this type in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Text => STRING_SIZE,
        }
    }

    /// Returns the SQL-ish display name for this type.
    pub const fn display_name(self) -> &'static str {
        match self {
            FieldType::Int => "INT",
            FieldType::Text => "TEXT",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A single typed column value.
///
/// `Field` implements `Eq` and `Hash` so it can serve as a grouping key in
/// the aggregation layer and as a histogram input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    /// An integer value.
    Int(i32),
    /// A text value.
    Text(String),
}

impl Field {
    /// Returns the type of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Text(_) => FieldType::Text,
        }
    }

    /// Serializes this value into `buf` using its fixed on-disk width.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError::TextTooLong` if a text value exceeds the
    /// field width.
    pub fn write_to(&self, buf: &mut impl BufMut) -> Result<(), SerializationError> {
        match self {
            Field::Int(v) => buf.put_i32(*v),
            Field::Text(s) => {
                let content = s.as_bytes();
                if content.len() > STRING_SIZE - 4 {
                    return Err(SerializationError::TextTooLong {
                        length: content.len(),
                    });
                }
                buf.put_u32(content.len() as u32);
                buf.put_slice(content);
                buf.put_bytes(0, STRING_SIZE - 4 - content.len());
            }
        }
        Ok(())
    }

    /// Deserializes a value of type `ty` from `buf`, consuming exactly
    /// `ty.byte_size()` bytes.
    pub fn read_from(buf: &mut impl Buf, ty: FieldType) -> Result<Field, SerializationError> {
        match ty {
            FieldType::Int => {
                if buf.remaining() < 4 {
                    return Err(SerializationError::InvalidImage(
                        "truncated integer field".to_string(),
                    ));
                }
                Ok(Field::Int(buf.get_i32()))
            }
            FieldType::Text => {
                if buf.remaining() < STRING_SIZE {
                    return Err(SerializationError::InvalidImage(
                        "truncated text field".to_string(),
                    ));
                }
                let len = buf.get_u32() as usize;
                if len > STRING_SIZE - 4 {
                    return Err(SerializationError::InvalidImage(format!(
                        "text length {} exceeds field width",
                        len
                    )));
                }
                let mut content = vec![0u8; len];
                buf.copy_to_slice(&mut content);
                buf.advance(STRING_SIZE - 4 - len);
                let s = String::from_utf8(content).map_err(|_| {
                    SerializationError::InvalidImage("text field is not UTF-8".to_string())
                })?;
                Ok(Field::Text(s))
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Int(v)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip(field: Field) -> Field {
        let mut buf = BytesMut::new();
        field.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), field.field_type().byte_size());
        Field::read_from(&mut buf.freeze(), field.field_type()).unwrap()
    }

    #[test]
    fn test_int_roundtrip() {
        for v in [0, 1, -1, i32::MAX, i32::MIN, 424242] {
            assert_eq!(roundtrip(Field::Int(v)), Field::Int(v));
        }
    }

    #[test]
    fn test_int_is_big_endian() {
        let mut buf = BytesMut::new();
        Field::Int(0x0102_0304).write_to(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_text_roundtrip() {
        for s in ["", "a", "hello world", "ünïcödé"] {
            assert_eq!(roundtrip(Field::from(s)), Field::from(s));
        }
    }

    #[test]
    fn test_text_layout() {
        let mut buf = BytesMut::new();
        Field::from("ab").write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), STRING_SIZE);
        assert_eq!(&buf[..6], &[0, 0, 0, 2, b'a', b'b']);
        assert!(buf[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_text_max_length() {
        let max = "x".repeat(STRING_SIZE - 4);
        assert_eq!(roundtrip(Field::Text(max.clone())), Field::Text(max));

        let over = "x".repeat(STRING_SIZE - 3);
        let mut buf = BytesMut::new();
        let err = Field::Text(over).write_to(&mut buf).unwrap_err();
        assert!(matches!(err, SerializationError::TextTooLong { .. }));
    }

    #[test]
    fn test_corrupt_text_length() {
        let mut image = vec![0u8; STRING_SIZE];
        image[..4].copy_from_slice(&(STRING_SIZE as u32).to_be_bytes());
        let err = Field::read_from(&mut &image[..], FieldType::Text).unwrap_err();
        assert!(matches!(err, SerializationError::InvalidImage(_)));
    }

    #[test]
    fn test_field_type_sizes() {
        assert_eq!(FieldType::Int.byte_size(), 4);
        assert_eq!(FieldType::Text.byte_size(), STRING_SIZE);
    }
}
