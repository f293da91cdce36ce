pub mod file;
pub mod record;

pub use file::{
    FileError, FileHandle, FileResult, OpenFileRegistry, PAGE_SIZE, PageCounters, PageNum,
    PagedFileManager,
};
pub use record::{
    Attribute, DataType, MAX_RECORD_SIZE, PageStats, Record, RecordBasedFileManager,
    RecordDescriptor, RecordError, RecordId, RecordPage, RecordResult, SlotNum, Value,
};
