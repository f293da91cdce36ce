use std::io;
use thiserror::Error;

use super::PageNum;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Could not create file {path}: {source}")]
    FileCreateError { path: String, source: io::Error },

    #[error("Could not delete file {path}: {source}")]
    FileDeleteError { path: String, source: io::Error },

    #[error("Could not open file {path}: {source}")]
    FileOpenError { path: String, source: io::Error },

    #[error("Could not close file {path}: {source}")]
    FileCloseError { path: String, source: io::Error },

    #[error("File is already open through another handle: {0}")]
    FileAlreadyOpen(String),

    #[error("File handle is already bound to {0}")]
    HandleInUse(String),

    #[error("File handle is not bound to any file")]
    HandleEmpty,

    #[error("Page not found: page_num={page_num}, page_count={page_count}")]
    PageNotFound { page_num: PageNum, page_count: PageNum },

    #[error("Incomplete read of page {0}")]
    IncompletePageRead(PageNum),

    #[error("Incomplete write of page {0}")]
    IncompletePageWrite(PageNum),

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },
}

pub type FileResult<T> = Result<T, FileError>;
