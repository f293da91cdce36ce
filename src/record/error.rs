use crate::file::{FileError, PageNum};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Slot not found: page_num={page_num}, slot_num={slot_num}")]
    SlotNotFound { page_num: PageNum, slot_num: u16 },

    #[error("Record deleted: page_num={page_num}, slot_num={slot_num}")]
    RecordDeleted { page_num: PageNum, slot_num: u16 },

    #[error("Record of {size} bytes exceeds the maximum of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Page full: page_num={0}")]
    PageFull(PageNum),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Malformed page: {0}")]
    MalformedPage(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Value of {actual} bytes exceeds VARCHAR({max})")]
    ValueTooLong { max: usize, actual: usize },

    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),
}

pub type RecordResult<T> = Result<T, RecordError>;
