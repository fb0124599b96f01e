//! Append-only store file with length-prefixed record framing.
//!
//! ## Public invariants (must not change without a format bump)
//!
//! - **Record framing** (big-endian): `length:u64 | payload bytes...`
//! - The position returned by an append is the byte offset of the length
//!   prefix, and is what the index records.
//! - Opening an existing file adopts its length as the starting size, so
//!   positions keep advancing where the previous session stopped.
//!
//! Writes are buffered; every read path drains the buffer first so a
//! position handed out by `append` is always readable in-process. The store
//! serializes all access through an internal mutex, which is what makes the
//! flush race between an append and a positional read impossible.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::{LogError, LogResult};

/// Width of the length prefix preceding each record's payload.
pub(crate) const LEN_WIDTH: u64 = 8;

/// Hard cap applied when *reading* a length prefix, to avoid unbounded
/// allocations on corrupt store files. Appends are not length-checked.
const MAX_RECORD_BYTES: u64 = 64 * 1024 * 1024;

pub(crate) struct Store {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

struct StoreInner {
    /// `None` once the store has been closed.
    writer: Option<BufWriter<File>>,
    size: u64,
}

impl Store {
    /// Open (or create) the store file at `path` in append mode.
    pub(crate) fn open(path: impl Into<PathBuf>) -> LogResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            inner: Mutex::new(StoreInner {
                writer: Some(BufWriter::new(file)),
                size,
            }),
        })
    }

    fn lock(&self) -> LogResult<MutexGuard<'_, StoreInner>> {
        self.inner.lock().map_err(|_| LogError::LockPoisoned("store"))
    }

    /// Append a framed record, returning `(bytes_written, position)`.
    ///
    /// The position is the byte offset of the length prefix and is valid for
    /// [`Store::read`] for the lifetime of the file.
    pub(crate) fn append(&self, bytes: &[u8]) -> LogResult<(u64, u64)> {
        let mut inner = self.lock()?;
        let position = inner.size;
        let writer = inner
            .writer
            .as_mut()
            .ok_or_else(|| LogError::InvalidState("store is closed".into()))?;
        writer.write_u64::<BigEndian>(bytes.len() as u64)?;
        writer.write_all(bytes)?;
        let written = LEN_WIDTH + bytes.len() as u64;
        inner.size += written;
        Ok((written, position))
    }

    /// Read the record whose length prefix begins at `position`.
    pub(crate) fn read(&self, position: u64) -> LogResult<Vec<u8>> {
        let mut inner = self.lock()?;
        let writer = inner
            .writer
            .as_mut()
            .ok_or_else(|| LogError::InvalidState("store is closed".into()))?;
        writer.flush()?;
        let file = writer.get_ref();

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        file.read_exact_at(&mut len_buf, position)?;
        let len = u64::from_be_bytes(len_buf);
        if len > MAX_RECORD_BYTES {
            return Err(LogError::Format(format!(
                "record length {len} at position {position} exceeds cap {MAX_RECORD_BYTES}"
            )));
        }
        let mut payload = vec![0u8; len as usize];
        file.read_exact_at(&mut payload, position + LEN_WIDTH)?;
        Ok(payload)
    }

    /// Positional read of raw store bytes into `buf`, returning the number of
    /// bytes read (zero at end of file). Used by the log-wide reader.
    pub(crate) fn read_at(&self, buf: &mut [u8], offset: u64) -> LogResult<usize> {
        let mut inner = self.lock()?;
        let writer = inner
            .writer
            .as_mut()
            .ok_or_else(|| LogError::InvalidState("store is closed".into()))?;
        writer.flush()?;
        Ok(writer.get_ref().read_at(buf, offset)?)
    }

    /// Current logical size in bytes, buffered writes included.
    pub(crate) fn size(&self) -> LogResult<u64> {
        Ok(self.lock()?.size)
    }

    /// Shrink the store to `len` bytes, discarding anything past it.
    pub(crate) fn truncate(&self, len: u64) -> LogResult<()> {
        let mut inner = self.lock()?;
        let writer = inner
            .writer
            .as_mut()
            .ok_or_else(|| LogError::InvalidState("store is closed".into()))?;
        writer.flush()?;
        writer.get_ref().set_len(len)?;
        inner.size = len;
        Ok(())
    }

    /// Flush buffered writes, sync to stable storage, and close the file.
    ///
    /// Closing an already-closed store is an error.
    pub(crate) fn close(&self) -> LogResult<()> {
        let mut inner = self.lock()?;
        let mut writer = inner
            .writer
            .take()
            .ok_or_else(|| LogError::InvalidState("store is closed".into()))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}
