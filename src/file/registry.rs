use ahash::AHashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::{FileError, FileResult};

/// Set of canonical paths currently bound to a live file handle.
///
/// Cloning shares the underlying set, so every manager built from the same
/// registry sees the same open files.
#[derive(Debug, Clone, Default)]
pub struct OpenFileRegistry {
    paths: Arc<Mutex<AHashSet<PathBuf>>>,
}

impl OpenFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canonical path; fails if some handle already holds it
    pub(crate) fn register(&self, path: &Path) -> FileResult<Registration> {
        let mut paths = self.lock();
        if !paths.insert(path.to_path_buf()) {
            return Err(FileError::FileAlreadyOpen(path.display().to_string()));
        }
        Ok(Registration {
            paths: Arc::clone(&self.paths),
            path: path.to_path_buf(),
        })
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    pub fn open_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, AHashSet<PathBuf>> {
        // The set holds no invariant a panicking holder could break
        self.paths.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held by a bound handle; releases the path when dropped
#[derive(Debug)]
pub(crate) struct Registration {
    paths: Arc<Mutex<AHashSet<PathBuf>>>,
    path: PathBuf,
}

impl Registration {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        paths.remove(&self.path);
    }
}
