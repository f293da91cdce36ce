use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use super::error::{FileError, FileResult};
use super::file_handle::FileHandle;
use super::registry::OpenFileRegistry;
use super::{PAGE_SIZE, PageNum};

/// Manages paged file lifecycle: creation, removal, and binding handles.
///
/// Page I/O itself goes through the bound `FileHandle`.
#[derive(Debug, Clone, Default)]
pub struct PagedFileManager {
    /// Canonical paths of files bound to a live handle
    registry: OpenFileRegistry,
}

impl PagedFileManager {
    /// Create a new paged file manager
    pub fn new() -> Self {
        Self::with_registry(OpenFileRegistry::new())
    }

    /// Create a paged file manager sharing an existing open-file registry
    pub fn with_registry(registry: OpenFileRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OpenFileRegistry {
        &self.registry
    }

    /// Create a new, empty file
    pub fn create_file<P: AsRef<Path>>(&self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::AlreadyExists(path.display().to_string()));
        }

        let create_error = |source| FileError::FileCreateError {
            path: path.display().to_string(),
            source,
        };

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(create_error)?;
        }

        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| match source.kind() {
                io::ErrorKind::AlreadyExists => {
                    FileError::AlreadyExists(path.display().to_string())
                }
                _ => create_error(source),
            })?;

        info!("created file {}", path.display());
        Ok(())
    }

    /// Remove (delete) a file. Handles on it must be closed first.
    pub fn destroy_file<P: AsRef<Path>>(&self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        std::fs::remove_file(path).map_err(|source| {
            warn!("destroy_file: could not delete {}: {}", path.display(), source);
            FileError::FileDeleteError {
                path: path.display().to_string(),
                source,
            }
        })?;

        info!("destroyed file {}", path.display());
        Ok(())
    }

    /// Open an existing file and bind it to `handle`
    pub fn open_file<P: AsRef<Path>>(&self, path: P, handle: &mut FileHandle) -> FileResult<()> {
        if let Ok(bound_path) = handle.path() {
            return Err(FileError::HandleInUse(bound_path.display().to_string()));
        }

        let path_ref = path.as_ref();
        let path = path_ref
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(path_ref.display().to_string()))?;

        let registration = self.registry.register(&path)?;

        // Open the file for reading and writing
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| FileError::FileOpenError {
                path: path.display().to_string(),
                source,
            })?;

        let page_count = page_count_of(&file, &path)?;
        handle.bind(file, page_count, registration);

        debug!("opened {} with {} pages", path.display(), page_count);
        Ok(())
    }

    /// Close the file bound to `handle`, flushing it first
    pub fn close_file(&self, handle: &mut FileHandle) -> FileResult<()> {
        handle.unbind()
    }
}

/// Number of whole pages in `file`; a partial trailing page is ignored
fn page_count_of(file: &File, path: &Path) -> FileResult<PageNum> {
    let file_size = file.metadata()?.len();
    let page_size = PAGE_SIZE as u64;

    if file_size % page_size != 0 {
        warn!(
            "{} has {} trailing bytes past the last full page; ignoring them",
            path.display(),
            file_size % page_size
        );
    }

    Ok(PageNum::try_from(file_size / page_size).unwrap_or(PageNum::MAX))
}
