use log::{debug, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::error::{FileError, FileResult};
use super::registry::Registration;
use super::{PAGE_SIZE, PageNum};

/// Page I/O counters accumulated since the handle was bound
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageCounters {
    pub read: u32,
    pub write: u32,
    pub append: u32,
}

/// State owned by a handle while it is bound to a file
#[derive(Debug)]
struct BoundFile {
    file: File,
    page_count: PageNum,
    registration: Registration,
}

impl BoundFile {
    fn check_page(&self, page_num: PageNum) -> FileResult<()> {
        if page_num >= self.page_count {
            return Err(FileError::PageNotFound {
                page_num,
                page_count: self.page_count,
            });
        }
        Ok(())
    }
}

/// Handle to a paged file.
///
/// A handle starts empty, is bound by `PagedFileManager::open_file` and
/// returns to empty on `PagedFileManager::close_file`. Page operations on an
/// empty handle fail with `FileError::HandleEmpty`.
///
/// A handle is not meant to be shared between threads while bound; the
/// `&mut self` receivers on page operations serialize access per handle.
#[derive(Debug, Default)]
pub struct FileHandle {
    bound: Option<BoundFile>,
    counters: PageCounters,
}

fn page_offset(page_num: PageNum) -> u64 {
    page_num as u64 * PAGE_SIZE as u64
}

fn check_buffer(len: usize) -> FileResult<()> {
    if len != PAGE_SIZE {
        return Err(FileError::InvalidPageSize {
            expected: PAGE_SIZE,
            actual: len,
        });
    }
    Ok(())
}

impl FileHandle {
    /// Create an empty handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the handle is bound to a file
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Canonical path of the bound file
    pub fn path(&self) -> FileResult<&Path> {
        Ok(self.bound()?.registration.path())
    }

    /// Get the number of pages in the bound file
    pub fn number_of_pages(&self) -> FileResult<PageNum> {
        Ok(self.bound()?.page_count)
    }

    /// Counter values accumulated since the handle was bound
    pub fn collect_counter_values(&self) -> PageCounters {
        self.counters
    }

    /// Read page `page_num` into `buffer` (exactly `PAGE_SIZE` bytes)
    pub fn read_page(&mut self, page_num: PageNum, buffer: &mut [u8]) -> FileResult<()> {
        check_buffer(buffer.len())?;
        let bound = self.bound_mut()?;
        bound.check_page(page_num)?;

        bound.file.seek(SeekFrom::Start(page_offset(page_num)))?;
        bound.file.read_exact(buffer).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                warn!(
                    "read_page: short read of page {} in {}",
                    page_num,
                    bound.registration.path().display()
                );
                FileError::IncompletePageRead(page_num)
            }
            _ => FileError::Io(e),
        })?;

        self.counters.read += 1;
        debug!("read page {}", page_num);
        Ok(())
    }

    /// Overwrite page `page_num` with `buffer` and flush it to disk
    pub fn write_page(&mut self, page_num: PageNum, buffer: &[u8]) -> FileResult<()> {
        check_buffer(buffer.len())?;
        let bound = self.bound_mut()?;
        bound.check_page(page_num)?;

        write_at(bound, page_num, buffer)?;

        self.counters.write += 1;
        debug!("wrote page {}", page_num);
        Ok(())
    }

    /// Append `buffer` as a new page at the end of the file.
    /// Returns the number of the new page.
    pub fn append_page(&mut self, buffer: &[u8]) -> FileResult<PageNum> {
        check_buffer(buffer.len())?;
        let bound = self.bound_mut()?;
        let page_num = bound.page_count;

        // Written at the page boundary, so a partial trailing page is overwritten
        write_at(bound, page_num, buffer)?;
        bound.page_count += 1;

        self.counters.append += 1;
        debug!("appended page {}", page_num);
        Ok(page_num)
    }

    pub(crate) fn bind(&mut self, file: File, page_count: PageNum, registration: Registration) {
        self.bound = Some(BoundFile {
            file,
            page_count,
            registration,
        });
        self.counters = PageCounters::default();
    }

    /// Unbind the handle, flushing the file before it is released
    pub(crate) fn unbind(&mut self) -> FileResult<()> {
        let bound = self.bound.take().ok_or(FileError::HandleEmpty)?;
        bound
            .file
            .sync_all()
            .map_err(|source| FileError::FileCloseError {
                path: bound.registration.path().display().to_string(),
                source,
            })
    }

    fn bound(&self) -> FileResult<&BoundFile> {
        self.bound.as_ref().ok_or(FileError::HandleEmpty)
    }

    fn bound_mut(&mut self) -> FileResult<&mut BoundFile> {
        self.bound.as_mut().ok_or(FileError::HandleEmpty)
    }
}

fn write_at(bound: &mut BoundFile, page_num: PageNum, buffer: &[u8]) -> FileResult<()> {
    bound.file.seek(SeekFrom::Start(page_offset(page_num)))?;
    bound.file.write_all(buffer).map_err(|e| match e.kind() {
        io::ErrorKind::WriteZero => {
            warn!(
                "write_page: short write of page {} in {}",
                page_num,
                bound.registration.path().display()
            );
            FileError::IncompletePageWrite(page_num)
        }
        _ => FileError::Io(e),
    })?;
    bound.file.sync_data()?;
    Ok(())
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if let Some(bound) = self.bound.take() {
            warn!(
                "file handle for {} dropped while bound; closing it",
                bound.registration.path().display()
            );
            if let Err(e) = bound.file.sync_all() {
                warn!("flush on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PagedFileManager;
    use tempfile::TempDir;

    fn setup_open_file() -> (TempDir, PagedFileManager, FileHandle) {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();
        manager.create_file(&test_file).unwrap();

        let mut handle = FileHandle::new();
        manager.open_file(&test_file, &mut handle).unwrap();
        (temp_dir, manager, handle)
    }

    #[test]
    fn test_empty_handle_operations_fail() {
        let mut handle = FileHandle::new();
        let mut buffer = vec![0u8; PAGE_SIZE];

        assert!(!handle.is_bound());
        assert!(matches!(
            handle.read_page(0, &mut buffer),
            Err(FileError::HandleEmpty)
        ));
        assert!(matches!(
            handle.write_page(0, &buffer),
            Err(FileError::HandleEmpty)
        ));
        assert!(matches!(
            handle.append_page(&buffer),
            Err(FileError::HandleEmpty)
        ));
        assert!(matches!(
            handle.number_of_pages(),
            Err(FileError::HandleEmpty)
        ));
    }

    #[test]
    fn test_append_and_read_page() {
        let (_temp, _manager, mut handle) = setup_open_file();
        assert_eq!(handle.number_of_pages().unwrap(), 0);

        let mut page = vec![0u8; PAGE_SIZE];
        page[0] = 42;
        page[PAGE_SIZE - 1] = 255;

        let page_num = handle.append_page(&page).unwrap();
        assert_eq!(page_num, 0);
        assert_eq!(handle.number_of_pages().unwrap(), 1);

        let mut read_buffer = vec![0u8; PAGE_SIZE];
        handle.read_page(0, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, page);
    }

    #[test]
    fn test_write_then_read_is_identical() {
        let (_temp, _manager, mut handle) = setup_open_file();
        let zeros = vec![0u8; PAGE_SIZE];
        for _ in 0..3 {
            handle.append_page(&zeros).unwrap();
        }

        let page: Vec<u8> = (0..PAGE_SIZE).map(|i| (i % 251) as u8).collect();
        handle.write_page(1, &page).unwrap();

        let mut read_buffer = vec![0u8; PAGE_SIZE];
        handle.read_page(1, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, page);

        // Neighbours untouched
        handle.read_page(0, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, zeros);
        handle.read_page(2, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, zeros);
    }

    #[test]
    fn test_page_bounds() {
        let (_temp, _manager, mut handle) = setup_open_file();
        let mut buffer = vec![0u8; PAGE_SIZE];

        assert!(matches!(
            handle.read_page(0, &mut buffer),
            Err(FileError::PageNotFound {
                page_num: 0,
                page_count: 0
            })
        ));

        handle.append_page(&buffer).unwrap();
        assert!(handle.read_page(0, &mut buffer).is_ok());
        assert!(matches!(
            handle.write_page(1, &buffer),
            Err(FileError::PageNotFound { page_num: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_buffer_size() {
        let (_temp, _manager, mut handle) = setup_open_file();

        let mut small_buffer = vec![0u8; PAGE_SIZE - 1];
        let result = handle.read_page(0, &mut small_buffer);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));

        let large_buffer = vec![0u8; PAGE_SIZE + 1];
        let result = handle.append_page(&large_buffer);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));
        assert_eq!(handle.number_of_pages().unwrap(), 0);
    }

    #[test]
    fn test_counters() {
        let (_temp, _manager, mut handle) = setup_open_file();
        let mut buffer = vec![0u8; PAGE_SIZE];

        handle.append_page(&buffer).unwrap();
        handle.append_page(&buffer).unwrap();
        handle.write_page(1, &buffer).unwrap();
        handle.read_page(0, &mut buffer).unwrap();
        handle.read_page(1, &mut buffer).unwrap();
        handle.read_page(1, &mut buffer).unwrap();

        // Failed operations are not counted
        let _ = handle.read_page(9, &mut buffer);

        assert_eq!(
            handle.collect_counter_values(),
            PageCounters {
                read: 3,
                write: 1,
                append: 2
            }
        );
    }
}
