//! Memory-mapped offset index.
//!
//! ## Public invariants (must not change without a format bump)
//!
//! - **Entry framing** (big-endian): `relative_offset:u32 | position:u64`,
//!   [`ENTRY_WIDTH`] bytes per entry, no header.
//! - While open, the file is pre-sized to `max_index_bytes` and mapped
//!   read/write shared; the mapping cannot grow, so pre-sizing is mandatory.
//! - On close, the file is truncated back to the high-water mark
//!   (`entries × ENTRY_WIDTH`). On reopen, the file size *is* the truth of
//!   how many entries exist; skipping truncate-on-close leaves a
//!   zero-padded tail that would corrupt offset recovery.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use memmap2::MmapMut;

use crate::error::{LogError, LogResult};

/// Width of the relative-offset column.
pub(crate) const OFFSET_WIDTH: u64 = 4;
/// Width of the position column.
pub(crate) const POSITION_WIDTH: u64 = 8;
/// Width of one index entry.
pub(crate) const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

pub(crate) struct Index {
    path: PathBuf,
    /// `None` once the index has been closed.
    file: Option<File>,
    mmap: Option<MmapMut>,
    /// High-water mark: byte offset one past the last valid entry.
    size: u64,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish()
    }
}

impl Index {
    /// Open (or create) the index file at `path`, pre-sizing it to
    /// `max_index_bytes` and mapping it read/write.
    ///
    /// The file size observed *before* pre-sizing is the high-water mark of
    /// valid entries left behind by the previous clean close.
    pub(crate) fn open(path: impl Into<PathBuf>, max_index_bytes: u64) -> LogResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        file.set_len(max_index_bytes)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            path,
            file: Some(file),
            mmap: Some(mmap),
            size,
        })
    }

    fn read_slot(&self, slot: u64) -> LogResult<(u32, u64)> {
        let mmap = self
            .mmap
            .as_ref()
            .ok_or_else(|| LogError::InvalidState("index is closed".into()))?;
        let pos = slot * ENTRY_WIDTH;
        if self.size < pos + ENTRY_WIDTH {
            return Err(LogError::EndOfFile);
        }
        let entry = mmap
            .get(pos as usize..(pos + ENTRY_WIDTH) as usize)
            .ok_or(LogError::EndOfFile)?;
        let relative_offset = BigEndian::read_u32(&entry[..OFFSET_WIDTH as usize]);
        let position = BigEndian::read_u64(&entry[OFFSET_WIDTH as usize..]);
        Ok((relative_offset, position))
    }

    /// Read the entry for the given relative offset.
    ///
    /// Fails with [`LogError::EndOfFile`] when the entry lies beyond the
    /// high-water mark (including on an empty index).
    pub(crate) fn read(&self, relative_offset: u32) -> LogResult<(u32, u64)> {
        self.read_slot(u64::from(relative_offset))
    }

    /// Read the last valid entry, or [`LogError::EndOfFile`] when empty.
    pub(crate) fn last_entry(&self) -> LogResult<(u32, u64)> {
        // A size below one entry also covers a corrupt partial entry left by
        // an interrupted write of a foreign tool; there is nothing to read.
        if self.size < ENTRY_WIDTH {
            return Err(LogError::EndOfFile);
        }
        self.read_slot(self.size / ENTRY_WIDTH - 1)
    }

    /// Append an entry at the high-water mark.
    ///
    /// Fails with [`LogError::EndOfFile`] when the pre-sized mapping has no
    /// room for another entry: the segment-full signal.
    pub(crate) fn write(&mut self, relative_offset: u32, position: u64) -> LogResult<()> {
        let size = self.size;
        let mmap = self
            .mmap
            .as_mut()
            .ok_or_else(|| LogError::InvalidState("index is closed".into()))?;
        let entry = mmap
            .get_mut(size as usize..(size + ENTRY_WIDTH) as usize)
            .ok_or(LogError::EndOfFile)?;
        BigEndian::write_u32(&mut entry[..OFFSET_WIDTH as usize], relative_offset);
        BigEndian::write_u64(&mut entry[OFFSET_WIDTH as usize..], position);
        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Number of valid bytes (`entries × ENTRY_WIDTH`).
    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Sync the mapping and file, truncate to the high-water mark, and close.
    ///
    /// Closing an already-closed index is an error.
    pub(crate) fn close(&mut self) -> LogResult<()> {
        let (mmap, file) = match (self.mmap.take(), self.file.take()) {
            (Some(mmap), Some(file)) => (mmap, file),
            _ => return Err(LogError::InvalidState("index is closed".into())),
        };
        mmap.flush()?;
        drop(mmap);
        file.sync_all()?;
        file.set_len(self.size)?;
        Ok(())
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}
