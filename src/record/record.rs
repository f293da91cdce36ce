use std::fmt;

use super::error::{RecordError, RecordResult};
use super::schema::RecordDescriptor;
use super::value::Value;
use crate::file::PageNum;

/// Slot number within a page
pub type SlotNum = u16;

/// Physical identifier for a record (page + slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_num: PageNum,
    pub slot_num: SlotNum,
}

impl RecordId {
    pub fn new(page_num: PageNum, slot_num: SlotNum) -> Self {
        Self { page_num, slot_num }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_num, self.slot_num)
    }
}

/// A single record with typed values
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Create a new record
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Get the number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if record is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by index
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get all values
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Get the value of the attribute called `name`
    pub fn attribute(&self, descriptor: &RecordDescriptor, name: &str) -> RecordResult<&Value> {
        descriptor
            .find_attribute(name)
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| RecordError::AttributeNotFound(name.to_string()))
    }

    /// Serialize record to bytes according to descriptor.
    /// Format: [NULL bitmap] [fixed-width fields] [length-prefixed varchar fields]
    ///
    /// NULL fields contribute no bytes beyond their bitmap bit.
    pub fn serialize(&self, descriptor: &RecordDescriptor) -> RecordResult<Vec<u8>> {
        descriptor.validate_values(&self.values)?;

        let mut result = Vec::with_capacity(descriptor.max_record_size());

        // 1. NULL bitmap
        let mut bitmap = vec![0u8; descriptor.null_bitmap_size()];
        for (i, value) in self.values.iter().enumerate() {
            if value.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        result.extend_from_slice(&bitmap);

        // 2. Fixed-width fields, then 3. variable-length fields
        for fixed_pass in [true, false] {
            for (value, attr) in self.values.iter().zip(descriptor.attributes()) {
                if !value.is_null() && attr.data_type.is_fixed() == fixed_pass {
                    result.extend_from_slice(&value.serialize(&attr.data_type)?);
                }
            }
        }

        Ok(result)
    }

    /// Deserialize record from bytes according to descriptor
    pub fn deserialize(data: &[u8], descriptor: &RecordDescriptor) -> RecordResult<Self> {
        let bitmap_size = descriptor.null_bitmap_size();
        let bitmap = data.get(..bitmap_size).ok_or_else(|| {
            RecordError::MalformedRecord(format!(
                "Record of {} bytes is shorter than its {}-byte NULL bitmap",
                data.len(),
                bitmap_size
            ))
        })?;

        let mut values = vec![Value::Null; descriptor.len()];
        let mut offset = bitmap_size;

        for fixed_pass in [true, false] {
            for (i, attr) in descriptor.attributes().iter().enumerate() {
                let is_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
                if is_null || attr.data_type.is_fixed() != fixed_pass {
                    continue;
                }
                let (value, used) = Value::deserialize(&data[offset..], &attr.data_type)?;
                values[i] = value;
                offset += used;
            }
        }

        if offset != data.len() {
            return Err(RecordError::MalformedRecord(format!(
                "{} trailing bytes after last attribute",
                data.len() - offset
            )));
        }

        Ok(Record { values })
    }

    /// Human-readable rendering, e.g. `id: 7    name: ab`. Diagnostics only.
    pub fn format(&self, descriptor: &RecordDescriptor) -> String {
        descriptor
            .attributes()
            .iter()
            .zip(&self.values)
            .map(|(attr, value)| format!("{}: {}", attr.name, value))
            .collect::<Vec<_>>()
            .join("    ")
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Attribute, DataType};

    fn create_test_descriptor() -> RecordDescriptor {
        RecordDescriptor::new(vec![
            Attribute::new("id", DataType::Int),
            Attribute::new("name", DataType::VarChar(10)),
            Attribute::new("score", DataType::Real),
        ])
    }

    #[test]
    fn test_record_creation() {
        let record = Record::new(vec![
            Value::Int(1),
            Value::VarChar("Alice".to_string()),
            Value::Real(95.5),
        ]);
        assert_eq!(record.len(), 3);
        assert_eq!(record.get(0), Some(&Value::Int(1)));
        assert_eq!(record.get(3), None);
    }

    #[test]
    fn test_record_layout() {
        let descriptor = create_test_descriptor();
        let record = Record::new(vec![
            Value::Int(42),
            Value::VarChar("ab".to_string()),
            Value::Real(1.5),
        ]);

        let bytes = record.serialize(&descriptor).unwrap();
        // bitmap + int + real + (len + "ab")
        assert_eq!(bytes.len(), 1 + 4 + 4 + 2 + 2);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..5], &42i32.to_le_bytes());
        assert_eq!(&bytes[5..9], &1.5f32.to_le_bytes());
        assert_eq!(&bytes[9..11], &[2, 0]);
        assert_eq!(&bytes[11..], b"ab");

        let deserialized = Record::deserialize(&bytes, &descriptor).unwrap();
        assert_eq!(record, deserialized);
    }

    #[test]
    fn test_record_serialization_with_nulls() {
        let descriptor = create_test_descriptor();
        let record = Record::new(vec![Value::Int(42), Value::Null, Value::Null]);

        let bytes = record.serialize(&descriptor).unwrap();

        // Bits 1 and 2 set, only the int carries data
        assert_eq!(bytes[0], 0b00000110);
        assert_eq!(bytes.len(), 1 + 4);

        let deserialized = Record::deserialize(&bytes, &descriptor).unwrap();
        assert_eq!(record, deserialized);
    }

    #[test]
    fn test_all_null_record() {
        let descriptor = create_test_descriptor();
        let record = Record::new(vec![Value::Null, Value::Null, Value::Null]);
        let bytes = record.serialize(&descriptor).unwrap();
        assert_eq!(bytes, vec![0b00000111]);
        assert_eq!(Record::deserialize(&bytes, &descriptor).unwrap(), record);
    }

    #[test]
    fn test_wide_record_bitmap() {
        let attrs = (0..10)
            .map(|i| Attribute::new(format!("c{}", i), DataType::Int))
            .collect::<Vec<_>>();
        let descriptor = RecordDescriptor::new(attrs);
        let mut values = (0..10).map(Value::Int).collect::<Vec<_>>();
        values[9] = Value::Null;
        let record = Record::new(values);

        let bytes = record.serialize(&descriptor).unwrap();
        assert_eq!(&bytes[..2], &[0, 0b00000010]);
        assert_eq!(bytes.len(), 2 + 9 * 4);
        assert_eq!(Record::deserialize(&bytes, &descriptor).unwrap(), record);
    }

    #[test]
    fn test_record_validation_error() {
        let descriptor = create_test_descriptor();
        let record = Record::new(vec![
            Value::VarChar("not an int".to_string()),
            Value::Null,
            Value::Null,
        ]);
        assert!(matches!(
            record.serialize(&descriptor),
            Err(RecordError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_malformed_records() {
        let descriptor = create_test_descriptor();

        // Empty buffer has no room for the bitmap
        assert!(matches!(
            Record::deserialize(&[], &descriptor),
            Err(RecordError::MalformedRecord(_))
        ));

        // Bitmap says int and real present but the bytes stop early
        assert!(matches!(
            Record::deserialize(&[0b00000010, 1, 0, 0, 0, 1], &descriptor),
            Err(RecordError::MalformedRecord(_))
        ));

        // Trailing garbage
        let mut bytes = Record::new(vec![Value::Int(1), Value::Null, Value::Null])
            .serialize(&descriptor)
            .unwrap();
        bytes.push(0xff);
        assert!(matches!(
            Record::deserialize(&bytes, &descriptor),
            Err(RecordError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_format_and_attribute() {
        let descriptor = create_test_descriptor();
        let record = Record::new(vec![Value::Int(7), Value::VarChar("ab".to_string()), Value::Null]);

        assert_eq!(record.format(&descriptor), "id: 7    name: ab    score: NULL");
        assert_eq!(
            record.attribute(&descriptor, "name").unwrap(),
            &Value::VarChar("ab".to_string())
        );
        assert!(matches!(
            record.attribute(&descriptor, "missing"),
            Err(RecordError::AttributeNotFound(_))
        ));
    }
}
