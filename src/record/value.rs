use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{RecordError, RecordResult};

/// Size of the length prefix written before varchar bytes
pub const VARCHAR_LEN_SIZE: usize = 2;

/// Represents an attribute data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,          // 4 bytes
    Real,         // 4 bytes
    VarChar(u16), // length prefix + up to n bytes
}

impl DataType {
    /// Size in bytes for fixed-width types, `None` for varchar
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            DataType::Int => Some(4),
            DataType::Real => Some(4),
            DataType::VarChar(_) => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// Largest number of bytes a non-null value of this type occupies
    pub fn max_size(&self) -> usize {
        match self {
            DataType::VarChar(n) => VARCHAR_LEN_SIZE + *n as usize,
            fixed => fixed.fixed_size().unwrap_or(0),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Real => write!(f, "REAL"),
            DataType::VarChar(n) => write!(f, "VARCHAR({})", n),
        }
    }
}

/// Represents a single attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Real(f32),
    VarChar(String),
    Null,
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check whether this value may be stored in an attribute of `data_type`
    pub fn matches(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Null, _)
                | (Value::Int(_), DataType::Int)
                | (Value::Real(_), DataType::Real)
                | (Value::VarChar(_), DataType::VarChar(_))
        )
    }

    /// Serialize a non-null value to bytes.
    /// Varchar values carry a little-endian `u16` length prefix.
    pub fn serialize(&self, data_type: &DataType) -> RecordResult<Vec<u8>> {
        match (self, data_type) {
            (Value::Int(i), DataType::Int) => Ok(i.to_le_bytes().to_vec()),
            (Value::Real(r), DataType::Real) => Ok(r.to_le_bytes().to_vec()),
            (Value::VarChar(s), DataType::VarChar(max_len)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *max_len as usize {
                    return Err(RecordError::ValueTooLong {
                        max: *max_len as usize,
                        actual: bytes.len(),
                    });
                }
                let mut result = Vec::with_capacity(VARCHAR_LEN_SIZE + bytes.len());
                result.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
                result.extend_from_slice(bytes);
                Ok(result)
            }
            _ => Err(RecordError::TypeMismatch {
                expected: data_type.to_string(),
                actual: format!("{:?}", self),
            }),
        }
    }

    /// Deserialize a non-null value from the front of `bytes`.
    /// Returns the value and the number of bytes consumed.
    pub fn deserialize(bytes: &[u8], data_type: &DataType) -> RecordResult<(Self, usize)> {
        match data_type {
            DataType::Int => {
                let buf = take_array::<4>(bytes, "INT")?;
                Ok((Value::Int(i32::from_le_bytes(buf)), 4))
            }
            DataType::Real => {
                let buf = take_array::<4>(bytes, "REAL")?;
                Ok((Value::Real(f32::from_le_bytes(buf)), 4))
            }
            DataType::VarChar(_) => {
                let len = u16::from_le_bytes(take_array::<VARCHAR_LEN_SIZE>(bytes, "VARCHAR length")?)
                    as usize;
                let end = VARCHAR_LEN_SIZE + len;
                if bytes.len() < end {
                    return Err(RecordError::MalformedRecord(format!(
                        "VARCHAR of {} bytes runs past the end of the record",
                        len
                    )));
                }
                let s = String::from_utf8(bytes[VARCHAR_LEN_SIZE..end].to_vec())
                    .map_err(|e| RecordError::MalformedRecord(format!("Invalid UTF-8: {}", e)))?;
                Ok((Value::VarChar(s), end))
            }
        }
    }

    /// Parse a textual field (e.g. a CSV cell) as a value of `data_type`.
    /// `NULL` (any case) parses to `Value::Null`.
    pub fn parse(text: &str, data_type: &DataType) -> RecordResult<Self> {
        if text.eq_ignore_ascii_case("null") {
            return Ok(Value::Null);
        }

        let mismatch = || RecordError::TypeMismatch {
            expected: data_type.to_string(),
            actual: text.to_string(),
        };

        match data_type {
            DataType::Int => text.trim().parse().map(Value::Int).map_err(|_| mismatch()),
            DataType::Real => text.trim().parse().map(Value::Real).map_err(|_| mismatch()),
            DataType::VarChar(_) => Ok(Value::VarChar(text.to_string())),
        }
    }
}

fn take_array<const N: usize>(bytes: &[u8], what: &str) -> RecordResult<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            RecordError::MalformedRecord(format!(
                "Expected {} bytes for {}, got {}",
                N,
                what,
                bytes.len()
            ))
        })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::VarChar(s) => write!(f, "{}", s),
            Value::Null => write!(f, "NULL"),
        }
    }
}
