use super::error::{RecordError, RecordResult};
use super::record::SlotNum;
use crate::file::{PAGE_SIZE, PageNum};

/// Size of the directory header at the end of each page
pub const DIRECTORY_HEADER_SIZE: usize = 4;

/// Size of one slot entry in the directory
pub const SLOT_ENTRY_SIZE: usize = 6;

/// Largest record that fits on an empty page together with its slot entry
pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - DIRECTORY_HEADER_SIZE - SLOT_ENTRY_SIZE;

const SLOT_DELETED: u16 = 0x0001;
// Bits 4..16 of the flags hold the bytes reserved past `length`
const SLACK_SHIFT: u16 = 4;
const SLACK_MASK: u16 = 0x0FFF;

/// Directory header stored in the last bytes of each page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectoryHeader {
    pub slot_count: u16,        // 2 bytes - Entries in the slot directory
    pub free_space_offset: u16, // 2 bytes - First byte past the record area
}

impl DirectoryHeader {
    const OFFSET: usize = PAGE_SIZE - DIRECTORY_HEADER_SIZE;

    pub fn serialize(&self) -> [u8; DIRECTORY_HEADER_SIZE] {
        let mut result = [0u8; DIRECTORY_HEADER_SIZE];
        result[0..2].copy_from_slice(&self.slot_count.to_le_bytes());
        result[2..4].copy_from_slice(&self.free_space_offset.to_le_bytes());
        result
    }

    pub fn deserialize(data: &[u8]) -> RecordResult<Self> {
        if data.len() < DIRECTORY_HEADER_SIZE {
            return Err(RecordError::MalformedPage(format!(
                "Not enough data for directory header: {} bytes",
                data.len()
            )));
        }

        Ok(Self {
            slot_count: u16::from_le_bytes([data[0], data[1]]),
            free_space_offset: u16::from_le_bytes([data[2], data[3]]),
        })
    }

    /// Offset of the first byte of the slot directory
    fn directory_start(&self) -> usize {
        Self::OFFSET.saturating_sub(self.slot_count as usize * SLOT_ENTRY_SIZE)
    }
}

/// One slot directory entry: where a record lives and whether it is deleted.
///
/// `reserved` is the number of bytes the slot owns in the record area. It
/// only exceeds `length` after a record shrank in place, and drops back to
/// `length` when the page is compacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotEntry {
    pub offset: u16,
    pub length: u16,
    pub reserved: u16,
    pub deleted: bool,
}

impl SlotEntry {
    pub fn new(offset: u16, length: u16) -> Self {
        Self {
            offset,
            length,
            reserved: length,
            deleted: false,
        }
    }

    pub fn serialize(&self) -> [u8; SLOT_ENTRY_SIZE] {
        let slack = self.reserved.saturating_sub(self.length) & SLACK_MASK;
        let mut flags = slack << SLACK_SHIFT;
        if self.deleted {
            flags |= SLOT_DELETED;
        }
        let mut result = [0u8; SLOT_ENTRY_SIZE];
        result[0..2].copy_from_slice(&self.offset.to_le_bytes());
        result[2..4].copy_from_slice(&self.length.to_le_bytes());
        result[4..6].copy_from_slice(&flags.to_le_bytes());
        result
    }

    pub fn deserialize(data: &[u8]) -> RecordResult<Self> {
        if data.len() < SLOT_ENTRY_SIZE {
            return Err(RecordError::MalformedPage(format!(
                "Not enough data for slot entry: {} bytes",
                data.len()
            )));
        }

        let length = u16::from_le_bytes([data[2], data[3]]);
        let flags = u16::from_le_bytes([data[4], data[5]]);
        Ok(Self {
            offset: u16::from_le_bytes([data[0], data[1]]),
            length,
            reserved: length.saturating_add((flags >> SLACK_SHIFT) & SLACK_MASK),
            deleted: flags & SLOT_DELETED != 0,
        })
    }

    /// Offset one past the last record byte
    pub fn end(&self) -> usize {
        self.offset as usize + self.length as usize
    }

    /// Offset one past the last byte the slot owns
    pub fn reserved_end(&self) -> usize {
        self.offset as usize + self.reserved as usize
    }
}

/// Summary of one page's directory, used for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    pub page_num: PageNum,
    pub slot_count: usize,
    pub live_records: usize,
    pub tombstones: usize,
    pub free_space: usize,
    pub reclaimable: usize,
}

/// Slotted view over a page buffer.
///
/// Records grow forward from offset 0; the slot directory grows backward
/// from the directory header at the end of the page. Borrows the buffer for
/// the duration of one operation only.
pub struct RecordPage<'a> {
    buffer: &'a mut [u8],
    page_num: PageNum,
    header: DirectoryHeader, // Cached header for fast access
}

impl<'a> RecordPage<'a> {
    /// Initialize an empty record page in the provided buffer
    pub fn new(buffer: &'a mut [u8], page_num: PageNum) -> RecordResult<Self> {
        check_page_len(buffer.len())?;
        buffer.fill(0);
        let mut page = Self {
            buffer,
            page_num,
            header: DirectoryHeader::default(),
        };
        page.write_header();
        Ok(page)
    }

    /// Wrap an existing page buffer, validating its directory header.
    /// A zero-filled page is an empty record page.
    pub fn from_buffer(buffer: &'a mut [u8], page_num: PageNum) -> RecordResult<Self> {
        check_page_len(buffer.len())?;

        let header = DirectoryHeader::deserialize(&buffer[DirectoryHeader::OFFSET..])?;
        let directory_bytes = header.slot_count as usize * SLOT_ENTRY_SIZE;
        if directory_bytes > DirectoryHeader::OFFSET {
            return Err(RecordError::MalformedPage(format!(
                "page {}: {} slots do not fit in a page",
                page_num, header.slot_count
            )));
        }
        if header.free_space_offset as usize > header.directory_start() {
            return Err(RecordError::MalformedPage(format!(
                "page {}: free space offset {} overlaps the slot directory at {}",
                page_num,
                header.free_space_offset,
                header.directory_start()
            )));
        }

        Ok(Self {
            buffer,
            page_num,
            header,
        })
    }

    pub fn page_num(&self) -> PageNum {
        self.page_num
    }

    /// Get the number of slot entries (live and deleted)
    pub fn slot_count(&self) -> u16 {
        self.header.slot_count
    }

    pub fn free_space_offset(&self) -> u16 {
        self.header.free_space_offset
    }

    /// Contiguous bytes between the record area and the slot directory
    pub fn free_space(&self) -> usize {
        self.header.directory_start() - self.header.free_space_offset as usize
    }

    /// Largest record `insert` can place on this page right now
    pub fn insert_capacity(&self) -> RecordResult<usize> {
        Ok(if self.first_tombstone()?.is_some() {
            self.free_space()
        } else {
            self.free_space().saturating_sub(SLOT_ENTRY_SIZE)
        })
    }

    /// Check whether a record of `len` bytes can be inserted
    pub fn can_fit(&self, len: usize) -> RecordResult<bool> {
        Ok(len <= self.insert_capacity()?)
    }

    /// Decode the slot entry `slot_num`
    pub fn slot(&self, slot_num: SlotNum) -> RecordResult<SlotEntry> {
        if slot_num >= self.header.slot_count {
            return Err(RecordError::SlotNotFound {
                page_num: self.page_num,
                slot_num,
            });
        }

        let start = slot_position(slot_num);
        let slot = SlotEntry::deserialize(&self.buffer[start..start + SLOT_ENTRY_SIZE])?;

        if !slot.deleted && slot.reserved_end() > self.header.free_space_offset as usize {
            return Err(RecordError::MalformedPage(format!(
                "page {}: slot {} spans {}..{} past free space offset {}",
                self.page_num,
                slot_num,
                slot.offset,
                slot.reserved_end(),
                self.header.free_space_offset
            )));
        }

        Ok(slot)
    }

    /// Get the bytes of the live record in `slot_num`
    pub fn record(&self, slot_num: SlotNum) -> RecordResult<&[u8]> {
        let slot = self.live_slot(slot_num)?;
        Ok(&self.buffer[slot.offset as usize..slot.end()])
    }

    /// Bytes a live record may grow to without leaving its slot
    pub fn slot_capacity(&self, slot_num: SlotNum) -> RecordResult<usize> {
        Ok(self.live_slot(slot_num)?.reserved as usize)
    }

    /// Lowest-numbered deleted slot, reusable by the next insert
    pub fn first_tombstone(&self) -> RecordResult<Option<SlotNum>> {
        for slot_num in 0..self.header.slot_count {
            if self.slot(slot_num)?.deleted {
                return Ok(Some(slot_num));
            }
        }
        Ok(None)
    }

    /// Slot numbers of all live records, in slot order
    pub fn live_slots(&self) -> RecordResult<Vec<SlotNum>> {
        let mut live = Vec::new();
        for slot_num in 0..self.header.slot_count {
            if !self.slot(slot_num)?.deleted {
                live.push(slot_num);
            }
        }
        Ok(live)
    }

    /// Bytes in the record area held by deleted or shrunk records
    pub fn reclaimable(&self) -> RecordResult<usize> {
        let mut live_bytes = 0;
        for slot_num in self.live_slots()? {
            live_bytes += self.slot(slot_num)?.length as usize;
        }
        Ok((self.header.free_space_offset as usize).saturating_sub(live_bytes))
    }

    pub fn stats(&self) -> RecordResult<PageStats> {
        let live_records = self.live_slots()?.len();
        Ok(PageStats {
            page_num: self.page_num,
            slot_count: self.header.slot_count as usize,
            live_records,
            tombstones: self.header.slot_count as usize - live_records,
            free_space: self.free_space(),
            reclaimable: self.reclaimable()?,
        })
    }

    /// Place `data` in the free region and give it a slot.
    /// A deleted slot is reused before the directory is extended.
    pub fn insert(&mut self, data: &[u8]) -> RecordResult<SlotNum> {
        if data.len() > MAX_RECORD_SIZE {
            return Err(RecordError::RecordTooLarge {
                size: data.len(),
                max: MAX_RECORD_SIZE,
            });
        }
        if !self.can_fit(data.len())? {
            return Err(RecordError::PageFull(self.page_num));
        }

        let slot_num = match self.first_tombstone()? {
            Some(slot_num) => slot_num,
            None => {
                self.header.slot_count += 1;
                self.header.slot_count - 1
            }
        };

        let offset = self.append_bytes(data);
        self.set_slot(slot_num, SlotEntry::new(offset, data.len() as u16));
        self.write_header();
        Ok(slot_num)
    }

    /// Tombstone `slot_num`; its bytes stay until `compact`
    pub fn delete(&mut self, slot_num: SlotNum) -> RecordResult<()> {
        let mut slot = self.live_slot(slot_num)?;
        slot.deleted = true;
        self.set_slot(slot_num, slot);
        Ok(())
    }

    /// Overwrite a live record with `data` no longer than the bytes its slot
    /// reserves. Shrinking keeps the reservation so the record can grow back.
    pub fn update_in_place(&mut self, slot_num: SlotNum, data: &[u8]) -> RecordResult<()> {
        let mut slot = self.live_slot(slot_num)?;
        if data.len() > slot.reserved as usize {
            return Err(RecordError::PageFull(self.page_num));
        }

        let start = slot.offset as usize;
        self.buffer[start..start + data.len()].copy_from_slice(data);
        slot.length = data.len() as u16;
        self.set_slot(slot_num, slot);
        Ok(())
    }

    /// Move a live record into the free region with new contents,
    /// keeping its slot number. The old bytes become reclaimable.
    pub fn relocate(&mut self, slot_num: SlotNum, data: &[u8]) -> RecordResult<()> {
        self.live_slot(slot_num)?;
        if data.len() > self.free_space() {
            return Err(RecordError::PageFull(self.page_num));
        }

        let offset = self.append_bytes(data);
        self.set_slot(slot_num, SlotEntry::new(offset, data.len() as u16));
        self.write_header();
        Ok(())
    }

    /// Slide live records together to close gaps and drop trailing deleted
    /// slots from the directory. Slot numbers of live records never change.
    ///
    /// Returns the number of bytes of free space gained.
    pub fn compact(&mut self) -> RecordResult<usize> {
        let before = self.free_space();

        let mut live = Vec::new();
        for slot_num in 0..self.header.slot_count {
            let slot = self.slot(slot_num)?;
            if slot.deleted {
                self.set_slot(
                    slot_num,
                    SlotEntry {
                        deleted: true,
                        ..SlotEntry::default()
                    },
                );
            } else {
                live.push((slot_num, slot));
            }
        }
        live.sort_by_key(|(_, slot)| slot.offset);

        for pair in live.windows(2) {
            let ((prev_num, prev), (next_num, next)) = (pair[0], pair[1]);
            if (next.offset as usize) < prev.reserved_end() {
                return Err(RecordError::MalformedPage(format!(
                    "page {}: slot {} at {} overlaps slot {} ending at {}",
                    self.page_num,
                    next_num,
                    next.offset,
                    prev_num,
                    prev.reserved_end()
                )));
            }
        }

        let old_free = self.header.free_space_offset as usize;
        let mut cursor = 0usize;
        for (slot_num, mut slot) in live {
            let start = slot.offset as usize;
            self.buffer.copy_within(start..slot.end(), cursor);
            slot.offset = cursor as u16;
            slot.reserved = slot.length;
            cursor += slot.length as usize;
            self.set_slot(slot_num, slot);
        }

        self.buffer[cursor..old_free].fill(0);
        self.header.free_space_offset = cursor as u16;

        while self.header.slot_count > 0 && self.slot(self.header.slot_count - 1)?.deleted {
            self.header.slot_count -= 1;
            let start = slot_position(self.header.slot_count);
            self.buffer[start..start + SLOT_ENTRY_SIZE].fill(0);
        }

        self.write_header();
        Ok(self.free_space() - before)
    }

    fn live_slot(&self, slot_num: SlotNum) -> RecordResult<SlotEntry> {
        let slot = self.slot(slot_num)?;
        if slot.deleted {
            return Err(RecordError::RecordDeleted {
                page_num: self.page_num,
                slot_num,
            });
        }
        Ok(slot)
    }

    /// Copy `data` to the free space offset and advance it. Caller checks room.
    fn append_bytes(&mut self, data: &[u8]) -> u16 {
        let offset = self.header.free_space_offset;
        let start = offset as usize;
        self.buffer[start..start + data.len()].copy_from_slice(data);
        self.header.free_space_offset += data.len() as u16;
        offset
    }

    fn set_slot(&mut self, slot_num: SlotNum, slot: SlotEntry) {
        let start = slot_position(slot_num);
        self.buffer[start..start + SLOT_ENTRY_SIZE].copy_from_slice(&slot.serialize());
    }

    fn write_header(&mut self) {
        self.buffer[DirectoryHeader::OFFSET..].copy_from_slice(&self.header.serialize());
    }
}

fn check_page_len(len: usize) -> RecordResult<()> {
    if len != PAGE_SIZE {
        return Err(RecordError::MalformedPage(format!(
            "Buffer must be PAGE_SIZE ({}) bytes, got {}",
            PAGE_SIZE, len
        )));
    }
    Ok(())
}

/// Byte position of slot `slot_num`'s entry
fn slot_position(slot_num: SlotNum) -> usize {
    DirectoryHeader::OFFSET - (slot_num as usize + 1) * SLOT_ENTRY_SIZE
}
