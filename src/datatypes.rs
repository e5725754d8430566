//! Conversion between raw big-endian register bytes and typed values.

/// The wire representation of a register.
///
/// The string form (`"uint16"`, `"multidata"`, …) is the tag used in register catalogs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
pub enum DataType {
    #[strum(serialize = "string")]
    String,
    #[strum(serialize = "uint16")]
    UInt16Be,
    #[strum(serialize = "uint32")]
    UInt32Be,
    #[strum(serialize = "int16")]
    Int16Be,
    #[strum(serialize = "int32")]
    Int32Be,
    #[strum(serialize = "bitfield16")]
    Bitfield16,
    #[strum(serialize = "bitfield32")]
    Bitfield32,
    /// An opaque, register-aligned range of bytes.
    #[strum(serialize = "multidata")]
    MultiData,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("`{0}` is not a known register data type")]
    UnknownType(String),
    #[error("values of type {0} cannot be written")]
    NotWritable(DataType),
    #[error("{value} does not fit into {data_type}")]
    OutOfRange { value: i64, data_type: DataType },
    #[error("multidata value length must be a multiple of 2 (got {0} bytes)")]
    Misaligned(usize),
    #[error("{data_type} takes exactly {expected} bytes, got {actual}")]
    Length { data_type: DataType, expected: usize, actual: usize },
    #[error("cannot encode {kind} value as {data_type}")]
    Kind { data_type: DataType, kind: &'static str },
}

impl DataType {
    /// Parse a catalog tag such as `"int32"`.
    pub fn from_tag(tag: &str) -> Result<Self, Error> {
        tag.parse().map_err(|_| Error::UnknownType(tag.to_string()))
    }

    /// Number of registers a value of this type spans, if the type is fixed-width.
    pub const fn registers(&self) -> Option<u16> {
        match self {
            Self::UInt16Be | Self::Int16Be | Self::Bitfield16 => Some(1),
            Self::UInt32Be | Self::Int32Be | Self::Bitfield32 => Some(2),
            Self::String | Self::MultiData => None,
        }
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::UInt16Be | Self::UInt32Be | Self::Int16Be | Self::Int32Be)
    }

    pub const fn is_writable(&self) -> bool {
        self.is_numeric() || matches!(self, Self::MultiData)
    }
}

/// A value read from, or to be written to, a register.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Any of the 16/32-bit integer types, signed or not.
    Integer(i64),
    /// An integer after division by the register gain.
    Scaled(f64),
    Text(String),
    /// Bits rendered as `'0'`/`'1'` characters, most significant bit first.
    Bits(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Scaled(_) => "scaled",
            Value::Text(_) => "text",
            Value::Bits(_) => "bitfield",
            Value::Bytes(_) => "bytes",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Integer(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Integer(n) => Some(n as f64),
            Value::Scaled(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Bits(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => f.write_fmt(format_args!("{}", n)),
            // Debug keeps the fractional part of integral floats: `10000.0`, not `10000`.
            Value::Scaled(n) => f.write_fmt(format_args!("{:?}", n)),
            Value::Text(s) | Value::Bits(s) => f.write_str(s),
            Value::Bytes(b) => {
                for byte in b {
                    f.write_fmt(format_args!("{:02x}", byte))?;
                }
                Ok(())
            }
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Scaled(n) => serializer.serialize_f64(*n),
            Value::Text(s) | Value::Bits(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
        }
    }
}

macro_rules! integer_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Integer(n.into())
            }
        })*
    };
}

integer_from!(u8, i8, u16, i16, u32, i32, i64);

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Scaled(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Value {
    fn from(b: [u8; N]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(b: &[u8; N]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

fn exact<const N: usize>(bytes: &[u8], data_type: DataType) -> Result<[u8; N], Error> {
    <[u8; N]>::try_from(bytes).map_err(|_| Error::Length {
        data_type,
        expected: N,
        actual: bytes.len(),
    })
}

/// Decode the payload of a register read.
pub fn decode(bytes: &[u8], data_type: DataType) -> Result<Value, Error> {
    Ok(match data_type {
        DataType::String => {
            let text = String::from_utf8_lossy(bytes);
            Value::Text(text.trim_end_matches('\0').to_string())
        }
        DataType::UInt16Be => Value::Integer(u16::from_be_bytes(exact(bytes, data_type)?).into()),
        DataType::UInt32Be => Value::Integer(u32::from_be_bytes(exact(bytes, data_type)?).into()),
        DataType::Int16Be => Value::Integer(i16::from_be_bytes(exact(bytes, data_type)?).into()),
        DataType::Int32Be => Value::Integer(i32::from_be_bytes(exact(bytes, data_type)?).into()),
        DataType::Bitfield16 | DataType::Bitfield32 => {
            Value::Bits(bytes.iter().map(|b| format!("{b:08b}")).collect())
        }
        DataType::MultiData => Value::Bytes(bytes.to_vec()),
    })
}

/// Decode a payload using a catalog tag rather than a parsed [`DataType`].
pub fn decode_tagged(bytes: &[u8], tag: &str) -> Result<Value, Error> {
    decode(bytes, DataType::from_tag(tag)?)
}

/// Encode a value for a register write.
pub fn encode(value: &Value, data_type: DataType) -> Result<Vec<u8>, Error> {
    fn integer(value: &Value, data_type: DataType) -> Result<i64, Error> {
        value.as_integer().ok_or(Error::Kind { data_type, kind: value.kind() })
    }
    fn fit<T: TryFrom<i64>>(value: i64, data_type: DataType) -> Result<T, Error> {
        T::try_from(value).map_err(|_| Error::OutOfRange { value, data_type })
    }
    let bytes = match data_type {
        DataType::UInt16Be => {
            fit::<u16>(integer(value, data_type)?, data_type)?.to_be_bytes().to_vec()
        }
        DataType::UInt32Be => {
            fit::<u32>(integer(value, data_type)?, data_type)?.to_be_bytes().to_vec()
        }
        DataType::Int16Be => {
            fit::<i16>(integer(value, data_type)?, data_type)?.to_be_bytes().to_vec()
        }
        DataType::Int32Be => {
            fit::<i32>(integer(value, data_type)?, data_type)?.to_be_bytes().to_vec()
        }
        DataType::MultiData => match value {
            Value::Bytes(b) if b.len() % 2 == 0 => b.clone(),
            Value::Bytes(b) => return Err(Error::Misaligned(b.len())),
            other => return Err(Error::Kind { data_type, kind: other.kind() }),
        },
        DataType::String | DataType::Bitfield16 | DataType::Bitfield32 => {
            return Err(Error::NotWritable(data_type));
        }
    };
    Ok(bytes)
}

/// Split encoded bytes into register words, most significant word first.
pub fn to_words(bytes: &[u8]) -> Result<Vec<u16>, Error> {
    let mut remainder = bytes;
    let mut words = Vec::with_capacity(bytes.len() / 2);
    while let Some((word, rest)) = remainder.split_first_chunk::<2>() {
        words.push(u16::from_be_bytes(*word));
        remainder = rest;
    }
    if !remainder.is_empty() {
        return Err(Error::Misaligned(bytes.len()));
    }
    Ok(words)
}
