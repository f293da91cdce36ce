use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{RecordError, RecordResult};
use super::value::{DataType, Value};

/// Attribute definition: name and type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl Attribute {
    /// Create a new attribute
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered attribute list describing a record's layout.
///
/// Supplied by the caller on every record operation; never stored in the file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordDescriptor {
    attributes: Vec<Attribute>,
}

impl RecordDescriptor {
    /// Create a new record descriptor
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    /// Load a descriptor from a JSON array of attributes
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> RecordResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RecordError::SchemaMismatch(format!(
                "Could not read descriptor {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> RecordResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| RecordError::SchemaMismatch(format!("Invalid descriptor JSON: {}", e)))
    }

    /// Get all attributes
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Get attribute count
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Find attribute index by name
    pub fn find_attribute(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Get NULL bitmap size in bytes (⌈n/8⌉)
    pub fn null_bitmap_size(&self) -> usize {
        self.attributes.len().div_ceil(8)
    }

    /// Largest serialized size a record under this descriptor can have
    pub fn max_record_size(&self) -> usize {
        self.null_bitmap_size()
            + self
                .attributes
                .iter()
                .map(|a| a.data_type.max_size())
                .sum::<usize>()
    }

    /// Validate values against this descriptor
    pub fn validate_values(&self, values: &[Value]) -> RecordResult<()> {
        if values.len() != self.attributes.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "Expected {} attributes, got {}",
                self.attributes.len(),
                values.len()
            )));
        }

        for (value, attr) in values.iter().zip(&self.attributes) {
            if !value.matches(&attr.data_type) {
                return Err(RecordError::TypeMismatch {
                    expected: format!("{} for '{}'", attr.data_type, attr.name),
                    actual: format!("{:?}", value),
                });
            }
        }

        Ok(())
    }
}

impl From<Vec<Attribute>> for RecordDescriptor {
    fn from(attributes: Vec<Attribute>) -> Self {
        Self::new(attributes)
    }
}
