mod error;
mod file_handle;
mod file_manager;
mod registry;

pub use error::{FileError, FileResult};
pub use file_handle::{FileHandle, PageCounters};
pub use file_manager::PagedFileManager;
pub use registry::OpenFileRegistry;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page number type
pub type PageNum = u32;
