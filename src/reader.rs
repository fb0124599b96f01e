//! Bulk byte-stream reader over every segment's store.

use std::io::{self, Read};
use std::sync::Arc;

use crate::error::LogError;
use crate::store::Store;

/// Streams the raw store bytes of every segment in offset order.
///
/// Produced by [`Log::reader`](crate::Log::reader) from a snapshot of the
/// segment list; reads after the snapshot do not hold the log lock. The
/// stream is the concatenation of the segments' framed records
/// (`length:u64-be || payload`), so it can be re-decoded record by record or
/// shipped wholesale for snapshotting.
///
/// The snapshot does not pin segment data: if the log is closed or the
/// segments removed while a reader is outstanding, subsequent reads fail.
pub struct LogReader {
    cursors: Vec<StoreCursor>,
    current: usize,
}

impl LogReader {
    pub(crate) fn new(cursors: Vec<StoreCursor>) -> Self {
        Self {
            cursors,
            current: 0,
        }
    }
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(cursor) = self.cursors.get_mut(self.current) {
            let n = cursor.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.current += 1;
        }
        Ok(0)
    }
}

/// Positional-read cursor over one segment's store, starting at byte zero.
pub(crate) struct StoreCursor {
    store: Arc<Store>,
    offset: u64,
}

impl StoreCursor {
    pub(crate) fn new(store: Arc<Store>) -> Self {
        Self { store, offset: 0 }
    }
}

impl Read for StoreCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self
            .store
            .read_at(buf, self.offset)
            .map_err(into_io_error)?;
        self.offset += n as u64;
        Ok(n)
    }
}

fn into_io_error(err: LogError) -> io::Error {
    match err {
        LogError::Io(e) => e,
        other => io::Error::other(other),
    }
}
