mod error;
mod page;
mod record;
mod schema;
mod value;


pub use error::{RecordError, RecordResult};
pub use page::{
    DIRECTORY_HEADER_SIZE, DirectoryHeader, MAX_RECORD_SIZE, PageStats, RecordPage,
    SLOT_ENTRY_SIZE, SlotEntry,
};
pub use record::{Record, RecordId, SlotNum};
pub use schema::{Attribute, RecordDescriptor};
pub use value::{DataType, VARCHAR_LEN_SIZE, Value};

use ahash::AHashMap;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::file::{FileHandle, PAGE_SIZE, PageNum, PagedFileManager};

/// Record-based file manager: heap files of variable-length records.
///
/// Owns a `PagedFileManager` for file lifecycle and keeps, per open file, a
/// hint of how large a record each page can still take. Hints are only used
/// to pick candidate pages; the page itself is always checked before writing.
#[derive(Debug, Default)]
pub struct RecordBasedFileManager {
    file_manager: PagedFileManager,
    /// Canonical path -> insert capacity of each page, `None` until the page
    /// has been read
    free_space_hints: Mutex<AHashMap<PathBuf, Vec<Option<usize>>>>,
}

impl RecordBasedFileManager {
    /// Create a new record manager with its own paged file manager
    pub fn new() -> Self {
        Self::with_file_manager(PagedFileManager::new())
    }

    /// Create a record manager on top of an existing paged file manager
    pub fn with_file_manager(file_manager: PagedFileManager) -> Self {
        Self {
            file_manager,
            free_space_hints: Mutex::new(AHashMap::new()),
        }
    }

    /// Get a reference to the paged file manager
    pub fn file_manager(&self) -> &PagedFileManager {
        &self.file_manager
    }

    /// Create a new record file
    pub fn create_file<P: AsRef<Path>>(&self, path: P) -> RecordResult<()> {
        Ok(self.file_manager.create_file(path)?)
    }

    /// Destroy a record file. Handles on it must be closed first.
    pub fn destroy_file<P: AsRef<Path>>(&self, path: P) -> RecordResult<()> {
        if let Ok(canonical) = path.as_ref().canonicalize() {
            self.hints().remove(&canonical);
        }
        Ok(self.file_manager.destroy_file(path)?)
    }

    /// Open a record file and bind it to `handle`
    pub fn open_file<P: AsRef<Path>>(&self, path: P, handle: &mut FileHandle) -> RecordResult<()> {
        self.file_manager.open_file(path, handle)?;
        let path = handle.path()?.to_path_buf();
        self.hints().remove(&path);
        Ok(())
    }

    /// Close the record file bound to `handle`
    pub fn close_file(&self, handle: &mut FileHandle) -> RecordResult<()> {
        if let Ok(path) = handle.path() {
            self.hints().remove(path);
        }
        Ok(self.file_manager.close_file(handle)?)
    }

    /// Insert a record, returning its identifier
    pub fn insert_record(
        &self,
        handle: &mut FileHandle,
        descriptor: &RecordDescriptor,
        record: &Record,
    ) -> RecordResult<RecordId> {
        let record_bytes = record.serialize(descriptor)?;
        if record_bytes.len() > MAX_RECORD_SIZE {
            return Err(RecordError::RecordTooLarge {
                size: record_bytes.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let mut buffer = vec![0u8; PAGE_SIZE];

        for page_num in self.candidate_pages(handle, record_bytes.len())? {
            handle.read_page(page_num, &mut buffer)?;
            let mut page = RecordPage::from_buffer(&mut buffer, page_num)?;

            if !page.can_fit(record_bytes.len())? {
                // Stale hint
                self.note_capacity(handle, page_num, page.insert_capacity()?)?;
                continue;
            }

            let slot_num = page.insert(&record_bytes)?;
            let capacity = page.insert_capacity()?;
            handle.write_page(page_num, &buffer)?;
            self.note_capacity(handle, page_num, capacity)?;

            debug!(
                "inserted {} bytes at ({}, {})",
                record_bytes.len(),
                page_num,
                slot_num
            );
            return Ok(RecordId::new(page_num, slot_num));
        }

        // No existing page has room, append a new one
        let new_page_num = handle.number_of_pages()?;
        let mut page = RecordPage::new(&mut buffer, new_page_num)?;
        let slot_num = page.insert(&record_bytes)?;
        let capacity = page.insert_capacity()?;
        let page_num = handle.append_page(&buffer)?;
        self.note_capacity(handle, page_num, capacity)?;

        debug!(
            "inserted {} bytes at ({}, {}) on a new page",
            record_bytes.len(),
            page_num,
            slot_num
        );
        Ok(RecordId::new(page_num, slot_num))
    }

    /// Read the record identified by `rid`
    pub fn read_record(
        &self,
        handle: &mut FileHandle,
        descriptor: &RecordDescriptor,
        rid: RecordId,
    ) -> RecordResult<Record> {
        let mut buffer = vec![0u8; PAGE_SIZE];
        handle.read_page(rid.page_num, &mut buffer)?;
        let page = RecordPage::from_buffer(&mut buffer, rid.page_num)?;

        let record_bytes = page.record(rid.slot_num)?;
        Record::deserialize(record_bytes, descriptor)
    }

    /// Read a single attribute of the record identified by `rid`
    pub fn read_attribute(
        &self,
        handle: &mut FileHandle,
        descriptor: &RecordDescriptor,
        rid: RecordId,
        attribute_name: &str,
    ) -> RecordResult<Value> {
        let record = self.read_record(handle, descriptor, rid)?;
        record.attribute(descriptor, attribute_name).cloned()
    }

    /// Delete a record. Its slot stays reserved until it is reused.
    pub fn delete_record(
        &self,
        handle: &mut FileHandle,
        _descriptor: &RecordDescriptor,
        rid: RecordId,
    ) -> RecordResult<()> {
        let mut buffer = vec![0u8; PAGE_SIZE];
        handle.read_page(rid.page_num, &mut buffer)?;
        let mut page = RecordPage::from_buffer(&mut buffer, rid.page_num)?;

        page.delete(rid.slot_num)?;
        let capacity = page.insert_capacity()?;
        handle.write_page(rid.page_num, &buffer)?;
        self.note_capacity(handle, rid.page_num, capacity)?;

        debug!("deleted {}", rid);
        Ok(())
    }

    /// Update a record, returning the identifier it lives at afterwards.
    ///
    /// Records that fit the bytes their slot reserves are overwritten in place,
    /// so a record that shrank can grow back to its original size. Larger ones
    /// move within the same page when it has room, keeping `rid`.
    /// Otherwise the record is inserted elsewhere and `rid` is deleted, so
    /// callers must use the returned identifier.
    pub fn update_record(
        &self,
        handle: &mut FileHandle,
        descriptor: &RecordDescriptor,
        rid: RecordId,
        record: &Record,
    ) -> RecordResult<RecordId> {
        let record_bytes = record.serialize(descriptor)?;
        if record_bytes.len() > MAX_RECORD_SIZE {
            return Err(RecordError::RecordTooLarge {
                size: record_bytes.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let mut buffer = vec![0u8; PAGE_SIZE];
        handle.read_page(rid.page_num, &mut buffer)?;
        let mut page = RecordPage::from_buffer(&mut buffer, rid.page_num)?;
        let reserved = page.slot_capacity(rid.slot_num)?;

        if record_bytes.len() <= reserved {
            page.update_in_place(rid.slot_num, &record_bytes)?;
        } else if record_bytes.len() <= page.free_space() {
            page.relocate(rid.slot_num, &record_bytes)?;
        } else {
            let new_rid = self.insert_record(handle, descriptor, record)?;
            if let Err(e) = self.delete_record(handle, descriptor, rid) {
                warn!(
                    "update of {} inserted the new version at {} but could not delete the old one: {}",
                    rid, new_rid, e
                );
                return Err(e);
            }
            debug!("update moved {} to {}", rid, new_rid);
            return Ok(new_rid);
        }

        let capacity = page.insert_capacity()?;
        handle.write_page(rid.page_num, &buffer)?;
        self.note_capacity(handle, rid.page_num, capacity)?;
        Ok(rid)
    }

    /// Print a record in human-readable form
    pub fn print_record(&self, descriptor: &RecordDescriptor, record: &Record) {
        println!("{}", record.format(descriptor));
    }

    /// All live records in identifier order
    pub fn scan(
        &self,
        handle: &mut FileHandle,
        descriptor: &RecordDescriptor,
    ) -> RecordResult<Vec<(RecordId, Record)>> {
        let mut results = Vec::new();
        let mut buffer = vec![0u8; PAGE_SIZE];

        for page_num in 0..handle.number_of_pages()? {
            handle.read_page(page_num, &mut buffer)?;
            let page = RecordPage::from_buffer(&mut buffer, page_num)?;

            for slot_num in page.live_slots()? {
                let record = Record::deserialize(page.record(slot_num)?, descriptor)?;
                results.push((RecordId::new(page_num, slot_num), record));
            }
        }

        Ok(results)
    }

    /// Reclaim the bytes of deleted and shrunk records on one page.
    /// Live records keep their identifiers. Returns the bytes gained.
    pub fn compact_page(&self, handle: &mut FileHandle, page_num: PageNum) -> RecordResult<usize> {
        let mut buffer = vec![0u8; PAGE_SIZE];
        handle.read_page(page_num, &mut buffer)?;
        let mut page = RecordPage::from_buffer(&mut buffer, page_num)?;

        let reclaimed = page.compact()?;
        let capacity = page.insert_capacity()?;
        if reclaimed > 0 {
            handle.write_page(page_num, &buffer)?;
            info!("compacted page {}: {} bytes reclaimed", page_num, reclaimed);
        }
        self.note_capacity(handle, page_num, capacity)?;
        Ok(reclaimed)
    }

    /// Directory summary of every page in the file
    pub fn page_stats(&self, handle: &mut FileHandle) -> RecordResult<Vec<PageStats>> {
        let mut stats = Vec::new();
        let mut buffer = vec![0u8; PAGE_SIZE];

        for page_num in 0..handle.number_of_pages()? {
            handle.read_page(page_num, &mut buffer)?;
            stats.push(RecordPage::from_buffer(&mut buffer, page_num)?.stats()?);
        }

        Ok(stats)
    }

    /// Pages whose hinted capacity fits `len`, in page order.
    /// Pages not seen yet are read once to learn their capacity.
    fn candidate_pages(&self, handle: &mut FileHandle, len: usize) -> RecordResult<Vec<PageNum>> {
        let page_count = handle.number_of_pages()?;
        let unseen = {
            let path = handle.path()?;
            let mut hints = self.hints();
            let capacities = hints.entry(path.to_path_buf()).or_default();
            capacities.resize(page_count as usize, None);
            capacities
                .iter()
                .enumerate()
                .filter(|(_, capacity)| capacity.is_none())
                .map(|(page_num, _)| page_num as PageNum)
                .collect::<Vec<_>>()
        };

        if !unseen.is_empty() {
            let mut buffer = vec![0u8; PAGE_SIZE];
            for page_num in unseen {
                handle.read_page(page_num, &mut buffer)?;
                let page = RecordPage::from_buffer(&mut buffer, page_num)?;
                self.note_capacity(handle, page_num, page.insert_capacity()?)?;
            }
        }

        let path = handle.path()?;
        let hints = self.hints();
        Ok(hints
            .get(path)
            .map(|capacities| {
                capacities
                    .iter()
                    .enumerate()
                    .filter(|&(_, &capacity)| capacity.is_some_and(|capacity| capacity >= len))
                    .map(|(page_num, _)| page_num as PageNum)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default())
    }

    fn note_capacity(
        &self,
        handle: &FileHandle,
        page_num: PageNum,
        capacity: usize,
    ) -> RecordResult<()> {
        let path = handle.path()?;
        let mut hints = self.hints();
        let capacities = hints.entry(path.to_path_buf()).or_default();
        let idx = page_num as usize;
        if capacities.len() <= idx {
            capacities.resize(idx + 1, None);
        }
        capacities[idx] = Some(capacity);
        Ok(())
    }

    fn hints(&self) -> MutexGuard<'_, AHashMap<PathBuf, Vec<Option<usize>>>> {
        // Hints are advisory; a poisoned map is still usable
        self.free_space_hints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}
