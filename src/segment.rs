//! A segment pairs one store file with one index file under a base offset.
//!
//! The segment owns offset assignment: `next_offset` starts at the base
//! offset, is recovered from the last index entry on reopen, and advances by
//! one per append. Files are named `<base_offset>.store` and
//! `<base_offset>.index` with the base offset in decimal.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::SegmentConfig;
use crate::error::{LogError, LogResult};
use crate::index::{Index, ENTRY_WIDTH};
use crate::record::{self, Record};
use crate::store::{Store, LEN_WIDTH};

#[derive(Debug)]
pub(crate) struct Segment {
    store: Arc<Store>,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: SegmentConfig,
}

impl Segment {
    /// Open (or create) the segment for `base_offset` inside `dir`.
    ///
    /// Reopening recovers `next_offset` from the last index entry and then
    /// truncates any unindexed store tail left by a crash between a store
    /// append and its index write.
    pub(crate) fn open(dir: &Path, base_offset: u64, config: SegmentConfig) -> LogResult<Self> {
        let store = Arc::new(Store::open(dir.join(format!("{base_offset}.store")))?);
        let index = Index::open(
            dir.join(format!("{base_offset}.index")),
            config.max_index_bytes,
        )?;
        let next_offset = match index.last_entry() {
            Ok((relative_offset, _)) => base_offset
                .checked_add(u64::from(relative_offset) + 1)
                .ok_or_else(|| {
                    LogError::Format("index entry overflows the offset space".into())
                })?,
            Err(LogError::EndOfFile) => base_offset,
            Err(err) => return Err(err),
        };

        let segment = Self {
            store,
            index,
            base_offset,
            next_offset,
            config,
        };
        segment.repair_store_tail()?;
        Ok(segment)
    }

    /// Truncate the store back to the end of the last indexed record.
    ///
    /// A crash after a store append but before the matching index write
    /// leaves bytes no index entry can reach; they would sit invisible in the
    /// file forever, so they are dropped here instead.
    fn repair_store_tail(&self) -> LogResult<()> {
        let indexed_end = match self.index.last_entry() {
            Ok((_, position)) => {
                let payload = self.store.read(position)?;
                position + LEN_WIDTH + payload.len() as u64
            }
            Err(LogError::EndOfFile) => 0,
            Err(err) => return Err(err),
        };
        let size = self.store.size()?;
        if size > indexed_end {
            tracing::warn!(
                base_offset = self.base_offset,
                orphan_bytes = size - indexed_end,
                "truncating unindexed store tail"
            );
            self.store.truncate(indexed_end)?;
        }
        Ok(())
    }

    /// Append a record, assigning it the segment's next offset.
    ///
    /// Fails with [`LogError::EndOfFile`] when the index has no room for
    /// another entry; the log treats that as a rotation signal.
    pub(crate) fn append(&mut self, record: &mut Record) -> LogResult<u64> {
        let offset = self.next_offset;
        record.offset = offset;
        let bytes = record::marshal(record)?;
        let (_, position) = self.store.append(&bytes)?;
        self.index.write((offset - self.base_offset) as u32, position)?;
        self.next_offset += 1;
        Ok(offset)
    }

    /// Read the record at the given absolute offset.
    pub(crate) fn read(&self, offset: u64) -> LogResult<Record> {
        let relative_offset = offset
            .checked_sub(self.base_offset)
            .ok_or(LogError::OffsetOutOfRange { offset })?;
        let (_, position) = self.index.read(relative_offset as u32)?;
        let bytes = self.store.read(position)?;
        record::unmarshal(&bytes)
    }

    /// True when either the store or the index has reached its limit.
    pub(crate) fn is_maxed(&self) -> bool {
        let store_size = self.store.size().unwrap_or(u64::MAX);
        store_size >= self.config.max_store_bytes
            || self.index.size() + ENTRY_WIDTH > self.config.max_index_bytes
    }

    /// True when `offset` falls inside `[base_offset, next_offset)`.
    pub(crate) fn contains(&self, offset: u64) -> bool {
        self.base_offset <= offset && offset < self.next_offset
    }

    pub(crate) fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub(crate) fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub(crate) fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Close the index and store. Both are attempted; the first error wins.
    pub(crate) fn close(&mut self) -> LogResult<()> {
        let index_result = self.index.close();
        let store_result = self.store.close();
        index_result.and(store_result)
    }

    /// Close the segment and unlink both of its files.
    pub(crate) fn remove(mut self) -> LogResult<()> {
        self.close()?;
        fs::remove_file(self.index.path())?;
        fs::remove_file(self.store.path())?;
        Ok(())
    }
}
