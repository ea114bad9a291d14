use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::stream::{MemoryStream, StreamError, StreamWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PrimitiveKind {
    String = 1,
    Uint8 = 2,
    Uint16 = 3,
    Uint32 = 4,
    Uint64 = 5,
    Int8 = 6,
    Int16 = 7,
    Int32 = 8,
    Int64 = 9,
    Float = 10,
    Double = 11,
    Blob = 12,
    Unicode = 13,
    Vector2 = 14,
    Vector3 = 15,
    Vector4 = 16,
    Bool = 17,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 17] = [
        Self::String,
        Self::Uint8,
        Self::Uint16,
        Self::Uint32,
        Self::Uint64,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Float,
        Self::Double,
        Self::Blob,
        Self::Unicode,
        Self::Vector2,
        Self::Vector3,
        Self::Vector4,
        Self::Bool,
    ];

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| *kind as u8 == tag)
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Uint8 => "UINT8",
            Self::Uint16 => "UINT16",
            Self::Uint32 => "UINT32",
            Self::Uint64 => "UINT64",
            Self::Int8 => "INT8",
            Self::Int16 => "INT16",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Blob => "BLOB",
            Self::Unicode => "UNICODE",
            Self::Vector2 => "VECTOR2",
            Self::Vector3 => "VECTOR3",
            Self::Vector4 => "VECTOR4",
            Self::Bool => "BOOL",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Encoded size, or `None` for length-prefixed kinds.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Uint8 | Self::Int8 | Self::Bool => Some(1),
            Self::Uint16 | Self::Int16 => Some(2),
            Self::Uint32 | Self::Int32 | Self::Float => Some(4),
            Self::Uint64 | Self::Int64 | Self::Double | Self::Vector2 => Some(8),
            Self::Vector3 => Some(12),
            Self::Vector4 => Some(16),
            Self::String | Self::Blob | Self::Unicode => None,
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Uint8 => Value::Uint8(0),
            Self::Uint16 => Value::Uint16(0),
            Self::Uint32 => Value::Uint32(0),
            Self::Uint64 => Value::Uint64(0),
            Self::Int8 => Value::Int8(0),
            Self::Int16 => Value::Int16(0),
            Self::Int32 => Value::Int32(0),
            Self::Int64 => Value::Int64(0),
            Self::Float => Value::Float(0.0),
            Self::Double => Value::Double(0.0),
            Self::Blob => Value::Blob(Vec::new()),
            Self::Unicode => Value::Unicode(String::new()),
            Self::Vector2 => Value::Vector2(Vec2::ZERO),
            Self::Vector3 => Value::Vector3(Vec3::ZERO),
            Self::Vector4 => Value::Vector4(Vec4::ZERO),
            Self::Bool => Value::Bool(false),
        }
    }

    pub fn decode(self, stream: &mut MemoryStream) -> Result<Value, StreamError> {
        let value = match self {
            Self::String => Value::String(stream.read_string()?),
            Self::Uint8 => Value::Uint8(stream.read_u8()?),
            Self::Uint16 => Value::Uint16(stream.read_u16()?),
            Self::Uint32 => Value::Uint32(stream.read_u32()?),
            Self::Uint64 => Value::Uint64(stream.read_u64()?),
            Self::Int8 => Value::Int8(stream.read_i8()?),
            Self::Int16 => Value::Int16(stream.read_i16()?),
            Self::Int32 => Value::Int32(stream.read_i32()?),
            Self::Int64 => Value::Int64(stream.read_i64()?),
            Self::Float => Value::Float(stream.read_f32()?),
            Self::Double => Value::Double(stream.read_f64()?),
            Self::Blob => Value::Blob(stream.read_blob()?.to_vec()),
            Self::Unicode => Value::Unicode(stream.read_utf8_blob()?),
            Self::Vector2 => Value::Vector2(Vec2::new(stream.read_f32()?, stream.read_f32()?)),
            Self::Vector3 => Value::Vector3(Vec3::new(
                stream.read_f32()?,
                stream.read_f32()?,
                stream.read_f32()?,
            )),
            Self::Vector4 => Value::Vector4(Vec4::new(
                stream.read_f32()?,
                stream.read_f32()?,
                stream.read_f32()?,
                stream.read_f32()?,
            )),
            Self::Bool => Value::Bool(stream.read_bool()?),
        };
        Ok(value)
    }

    /// Returns `false` without writing anything when `value` is not of this
    /// kind. A `STRING` is NUL-terminated on the wire, so it may not contain one.
    pub fn encode(self, value: &Value, writer: &mut StreamWriter) -> bool {
        match (self, value) {
            (Self::String, Value::String(v)) if !v.contains('\0') => writer.write_string(v),
            (Self::Uint8, Value::Uint8(v)) => writer.write_u8(*v),
            (Self::Uint16, Value::Uint16(v)) => writer.write_u16(*v),
            (Self::Uint32, Value::Uint32(v)) => writer.write_u32(*v),
            (Self::Uint64, Value::Uint64(v)) => writer.write_u64(*v),
            (Self::Int8, Value::Int8(v)) => writer.write_i8(*v),
            (Self::Int16, Value::Int16(v)) => writer.write_i16(*v),
            (Self::Int32, Value::Int32(v)) => writer.write_i32(*v),
            (Self::Int64, Value::Int64(v)) => writer.write_i64(*v),
            (Self::Float, Value::Float(v)) => writer.write_f32(*v),
            (Self::Double, Value::Double(v)) => writer.write_f64(*v),
            (Self::Blob, Value::Blob(v)) => writer.write_blob(v),
            (Self::Unicode, Value::Unicode(v)) => writer.write_blob(v.as_bytes()),
            (Self::Vector2, Value::Vector2(v)) => {
                writer.write_f32(v.x);
                writer.write_f32(v.y);
            }
            (Self::Vector3, Value::Vector3(v)) => {
                writer.write_f32(v.x);
                writer.write_f32(v.y);
                writer.write_f32(v.z);
            }
            (Self::Vector4, Value::Vector4(v)) => {
                writer.write_f32(v.x);
                writer.write_f32(v.y);
                writer.write_f32(v.z);
                writer.write_f32(v.w);
            }
            (Self::Bool, Value::Bool(v)) => writer.write_bool(*v),
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Unicode(String),
    Blob(Vec<u8>),
    Vector2(Vec2),
    Vector3(Vec3),
    Vector4(Vec4),
    Array(Vec<Value>),
    Dict(Vec<(String, Value)>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "BOOL",
            Self::Int8(_) => "INT8",
            Self::Int16(_) => "INT16",
            Self::Int32(_) => "INT32",
            Self::Int64(_) => "INT64",
            Self::Uint8(_) => "UINT8",
            Self::Uint16(_) => "UINT16",
            Self::Uint32(_) => "UINT32",
            Self::Uint64(_) => "UINT64",
            Self::Float(_) => "FLOAT",
            Self::Double(_) => "DOUBLE",
            Self::String(_) => "STRING",
            Self::Unicode(_) => "UNICODE",
            Self::Blob(_) => "BLOB",
            Self::Vector2(_) => "VECTOR2",
            Self::Vector3(_) => "VECTOR3",
            Self::Vector4(_) => "VECTOR4",
            Self::Array(_) => "ARRAY",
            Self::Dict(_) => "FIXED_DICT",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int8(v) => Some(v as i64),
            Self::Int16(v) => Some(v as i64),
            Self::Int32(v) => Some(v as i64),
            Self::Int64(v) => Some(v),
            Self::Uint8(v) => Some(v as i64),
            Self::Uint16(v) => Some(v as i64),
            Self::Uint32(v) => Some(v as i64),
            Self::Uint64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::Unicode(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Self::Vector3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Dict(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_and_names_are_consistent() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(PrimitiveKind::from_tag(kind.tag()), Some(kind));
            assert_eq!(PrimitiveKind::from_name(kind.name()), Some(kind));
            assert_eq!(kind.default_value().type_name(), kind.name());
        }
        assert_eq!(PrimitiveKind::from_tag(0), None);
        assert_eq!(PrimitiveKind::from_tag(200), None);
        assert_eq!(PrimitiveKind::from_name("ARRAY"), None);
    }

    #[test]
    fn fixed_sizes_match_encoding() {
        for kind in PrimitiveKind::ALL {
            let Some(size) = kind.fixed_size() else {
                continue;
            };
            let mut writer = StreamWriter::new();
            assert!(kind.encode(&kind.default_value(), &mut writer));
            assert_eq!(writer.len(), size, "{}", kind.name());
        }
    }

    #[test]
    fn encode_rejects_wrong_kind() {
        let mut writer = StreamWriter::new();
        assert!(!PrimitiveKind::Uint16.encode(&Value::Int16(3), &mut writer));
        assert!(writer.is_empty());
    }

    #[test]
    fn encode_rejects_string_with_nul() {
        let mut writer = StreamWriter::new();
        assert!(!PrimitiveKind::String.encode(&Value::String("ki\0ra".into()), &mut writer));
        assert!(writer.is_empty());
        // length-prefixed kinds carry NULs fine
        assert!(PrimitiveKind::Unicode.encode(&Value::Unicode("ki\0ra".into()), &mut writer));
    }

    #[test]
    fn vector_decoding() {
        let mut writer = StreamWriter::new();
        PrimitiveKind::Vector3.encode(&Value::Vector3(Vec3::new(1.0, -2.5, 3.25)), &mut writer);
        let mut stream = MemoryStream::new(writer.freeze());
        let value = PrimitiveKind::Vector3.decode(&mut stream).unwrap();
        assert_eq!(value.as_vec3(), Some(Vec3::new(1.0, -2.5, 3.25)));
    }
}
