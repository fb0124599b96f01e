//! The log: an ordered collection of segments with a single active tail.
//!
//! Appends always go to the last segment; once an append fills it, a fresh
//! segment is created at the next offset and becomes the tail. Reads are
//! routed to the segment whose `[base_offset, next_offset)` range contains
//! the requested offset. Setup scans the directory for `.store`/`.index`
//! pairs and reopens them in base-offset order.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::Config;
use crate::error::{LogError, LogResult};
use crate::reader::{LogReader, StoreCursor};
use crate::record::Record;
use crate::segment::Segment;

/// An append-only, offset-addressable record log persisted as a directory of
/// segment files.
///
/// All operations are thread-safe: reads and offset queries take a shared
/// lock on the segment list, while appends, truncation, and lifecycle
/// operations take the exclusive lock. Durability is guaranteed at
/// [`Log::close`], not per append.
#[derive(Debug)]
pub struct Log {
    dir: PathBuf,
    config: Config,
    segments: RwLock<Vec<Segment>>,
}

impl Log {
    /// Open (or create) a log rooted at `dir`.
    ///
    /// Existing segment files are reopened in ascending base-offset order and
    /// the last becomes the active tail; an empty directory gets a fresh
    /// segment at `config.segment.initial_offset`. A `.store`/`.index` file
    /// whose stem is not a decimal offset fails the open loudly.
    pub fn open(dir: impl Into<PathBuf>, config: Config) -> LogResult<Self> {
        let dir = dir.into();
        let config = config.normalized();
        fs::create_dir_all(&dir)?;
        let segments = Self::setup(&dir, &config)?;
        Ok(Self {
            dir,
            config,
            segments: RwLock::new(segments),
        })
    }

    fn setup(dir: &Path, config: &Config) -> LogResult<Vec<Segment>> {
        let mut base_offsets = BTreeSet::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                return Err(LogError::InvalidSegmentName {
                    name: name.to_string_lossy().into_owned(),
                });
            };
            // The same base offset appears once per extension; the set dedups.
            let Some(stem) = name
                .strip_suffix(".store")
                .or_else(|| name.strip_suffix(".index"))
            else {
                continue;
            };
            let base_offset =
                stem.parse::<u64>()
                    .map_err(|_| LogError::InvalidSegmentName {
                        name: name.to_string(),
                    })?;
            base_offsets.insert(base_offset);
        }

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base_offset in base_offsets {
            segments.push(Segment::open(dir, base_offset, config.segment)?);
        }
        if segments.is_empty() {
            segments.push(Segment::open(
                dir,
                config.segment.initial_offset,
                config.segment,
            )?);
        }
        tracing::debug!(
            dir = %dir.display(),
            segments = segments.len(),
            "log setup complete"
        );
        Ok(segments)
    }

    fn read_segments(&self) -> LogResult<RwLockReadGuard<'_, Vec<Segment>>> {
        self.segments.read().map_err(|_| LogError::LockPoisoned("log"))
    }

    fn write_segments(&self) -> LogResult<RwLockWriteGuard<'_, Vec<Segment>>> {
        self.segments
            .write()
            .map_err(|_| LogError::LockPoisoned("log"))
    }

    fn closed() -> LogError {
        LogError::InvalidState("log is closed".into())
    }

    /// Append a record to the active segment, returning its assigned offset.
    ///
    /// The record's `offset` field is set to the returned value before it is
    /// marshalled. If the append fills the active segment, a fresh tail is
    /// created so the next append lands there.
    pub fn append(&self, record: &mut Record) -> LogResult<u64> {
        let mut segments = self.write_segments()?;

        // A reopened directory can hand us a tail that is already full; a
        // store write against it could never be indexed, so rotate first.
        let active = segments.last().ok_or_else(Self::closed)?;
        if active.is_maxed() {
            let base_offset = active.next_offset();
            tracing::debug!(base_offset, "rotating full tail segment before append");
            segments.push(Segment::open(&self.dir, base_offset, self.config.segment)?);
        }

        let active = segments
            .last_mut()
            .expect("append requires an active segment");
        let offset = active.append(record)?;

        if active.is_maxed() {
            let base_offset = offset + 1;
            tracing::debug!(base_offset, "tail segment filled, rotating");
            segments.push(Segment::open(&self.dir, base_offset, self.config.segment)?);
        }
        Ok(offset)
    }

    /// Read the record stored at `offset`.
    pub fn read(&self, offset: u64) -> LogResult<Record> {
        let segments = self.read_segments()?;
        let segment = segments
            .iter()
            .find(|s| s.contains(offset))
            .ok_or(LogError::OffsetOutOfRange { offset })?;
        segment.read(offset)
    }

    fn close_segments(segments: &mut Vec<Segment>) -> LogResult<()> {
        let mut first_err = None;
        for segment in segments.iter_mut() {
            if let Err(err) = segment.close() {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        segments.clear();
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Close every segment, syncing indexes and stores to stable storage.
    ///
    /// Every segment is attempted even when one fails; the first error wins.
    /// After a close, all other operations fail until the log is reopened via
    /// [`Log::open`].
    pub fn close(&self) -> LogResult<()> {
        let mut segments = self.write_segments()?;
        Self::close_segments(&mut segments)
    }

    /// Close the log and delete its directory tree.
    pub fn remove(&self) -> LogResult<()> {
        let mut segments = self.write_segments()?;
        Self::close_segments(&mut segments)?;
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    /// Remove the log's data and set it up again, empty, in the same
    /// directory.
    pub fn reset(&self) -> LogResult<()> {
        let mut segments = self.write_segments()?;
        Self::close_segments(&mut segments)?;
        fs::remove_dir_all(&self.dir)?;
        fs::create_dir_all(&self.dir)?;
        *segments = Self::setup(&self.dir, &self.config)?;
        Ok(())
    }

    /// Lowest offset present in the log (the first segment's base offset).
    pub fn lowest_offset(&self) -> LogResult<u64> {
        let segments = self.read_segments()?;
        let first = segments.first().ok_or_else(Self::closed)?;
        Ok(first.base_offset())
    }

    /// Highest assigned offset, or 0 when nothing has been appended yet.
    pub fn highest_offset(&self) -> LogResult<u64> {
        let segments = self.read_segments()?;
        let last = segments.last().ok_or_else(Self::closed)?;
        let next_offset = last.next_offset();
        Ok(if next_offset == 0 { 0 } else { next_offset - 1 })
    }

    /// Remove every segment whose records all have offsets at or below
    /// `lowest`.
    ///
    /// A segment is dropped when `next_offset <= lowest + 1`. If that sweeps
    /// away every segment (only possible when the tail itself was empty or
    /// fully covered), a fresh tail is created at the old tail's
    /// `next_offset` so offset assignment continues without a gap.
    pub fn truncate(&self, lowest: u64) -> LogResult<()> {
        let mut segments = self.write_segments()?;
        if segments.is_empty() {
            return Err(Self::closed());
        }
        let resume_at = segments
            .last()
            .map(Segment::next_offset)
            .expect("non-empty segment list");

        let limit = lowest.saturating_add(1);
        let drained: Vec<Segment> = segments.drain(..).collect();
        // Decide every segment's fate even when a removal fails: kept
        // segments must go back into the list, and dropping an unvisited
        // segment unclosed would leave its index pre-sized on disk.
        let mut first_err = None;
        for segment in drained {
            if segment.next_offset() <= limit {
                tracing::debug!(
                    base_offset = segment.base_offset(),
                    "removing segment below truncation point"
                );
                if let Err(err) = segment.remove() {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            } else {
                segments.push(segment);
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }

        if segments.is_empty() {
            tracing::debug!(
                base_offset = resume_at,
                "truncation removed every segment, creating fresh tail"
            );
            segments.push(Segment::open(&self.dir, resume_at, self.config.segment)?);
        }
        Ok(())
    }

    /// Stream the raw store bytes of the whole log in offset order.
    ///
    /// The segment list is snapshotted under the shared lock; the returned
    /// reader then runs without holding any log lock.
    pub fn reader(&self) -> LogResult<LogReader> {
        let segments = self.read_segments()?;
        let cursors = segments
            .iter()
            .map(|s| StoreCursor::new(Arc::clone(s.store())))
            .collect();
        Ok(LogReader::new(cursors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentConfig;
    use crate::index::ENTRY_WIDTH;
    use crate::record::{marshal, unmarshal};
    use crate::store::LEN_WIDTH;
    use std::io::{self, Read};

    fn record() -> Record {
        Record::new(b"hello world".to_vec())
    }

    fn decode_stream(mut reader: impl Read) -> Vec<Record> {
        let mut records = Vec::new();
        loop {
            let mut len_buf = [0u8; 8];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => panic!("stream read failed: {e}"),
            }
            let len = u64::from_be_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            reader.read_exact(&mut payload).unwrap();
            records.push(unmarshal(&payload).unwrap());
        }
        records
    }

    #[test]
    fn log_append_read_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let log = Log::open(tmp.path(), Config::default()).unwrap();

        for want in 0..10u64 {
            let mut rec = record();
            assert_eq!(log.append(&mut rec).unwrap(), want);
            assert_eq!(rec.offset, want);
        }
        for offset in 0..10u64 {
            let rec = log.read(offset).unwrap();
            assert_eq!(rec.offset, offset);
            assert_eq!(rec.value, b"hello world");
        }
        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), 9);
    }

    #[test]
    fn log_read_out_of_range() {
        let tmp = tempfile::tempdir().unwrap();
        let log = Log::open(tmp.path(), Config::default()).unwrap();

        // Empty log: nothing is readable.
        assert!(matches!(
            log.read(0),
            Err(LogError::OffsetOutOfRange { offset: 0 })
        ));

        log.append(&mut record()).unwrap();
        let beyond = log.highest_offset().unwrap() + 1;
        assert!(matches!(
            log.read(beyond),
            Err(LogError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn log_rotates_when_index_fills() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            segment: SegmentConfig {
                max_store_bytes: 1024,
                max_index_bytes: ENTRY_WIDTH * 3,
                initial_offset: 16,
            },
        };
        let log = Log::open(tmp.path(), config).unwrap();

        for want in 16..20u64 {
            assert_eq!(log.append(&mut record()).unwrap(), want);
        }

        // Three records fill the first segment; the fourth lands in a fresh
        // one, giving exactly two segments.
        let segments = log.read_segments().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].base_offset(), 16);
        assert_eq!(segments[0].next_offset(), 19);
        assert_eq!(segments[1].base_offset(), 19);
        assert_eq!(segments[1].next_offset(), 20);
    }

    #[test]
    fn log_reopen_preserves_records() {
        let tmp = tempfile::tempdir().unwrap();

        let log = Log::open(tmp.path(), Config::default()).unwrap();
        for _ in 0..5 {
            log.append(&mut record()).unwrap();
        }
        log.close().unwrap();

        let log = Log::open(tmp.path(), Config::default()).unwrap();
        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), 4);
        for offset in 0..5u64 {
            assert_eq!(log.read(offset).unwrap().value, b"hello world");
        }

        // Appends continue where the previous session stopped.
        assert_eq!(log.append(&mut record()).unwrap(), 5);
    }

    #[test]
    fn log_truncate_drops_whole_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            segment: SegmentConfig {
                max_store_bytes: 64 * 1024,
                max_index_bytes: ENTRY_WIDTH * 10,
                initial_offset: 0,
            },
        };
        let log = Log::open(tmp.path(), config).unwrap();
        for _ in 0..30 {
            log.append(&mut record()).unwrap();
        }

        // Segments now cover [0,10), [10,20), [20,30) plus an empty tail.
        log.truncate(14).unwrap();

        // Only [0,10) satisfies next_offset <= 15; [10,20) must survive
        // because it still holds offsets 15..20.
        assert_eq!(log.lowest_offset().unwrap(), 10);
        assert!(matches!(
            log.read(9),
            Err(LogError::OffsetOutOfRange { .. })
        ));
        assert_eq!(log.read(14).unwrap().offset, 14);
        assert_eq!(log.highest_offset().unwrap(), 29);
    }

    #[test]
    fn log_truncate_past_end_creates_fresh_tail() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            segment: SegmentConfig {
                max_store_bytes: 64 * 1024,
                max_index_bytes: ENTRY_WIDTH * 100,
                initial_offset: 0,
            },
        };
        let log = Log::open(tmp.path(), config).unwrap();
        for _ in 0..5 {
            log.append(&mut record()).unwrap();
        }

        // Truncating ahead of all data removes the only segment; the log
        // stays usable and offset assignment does not jump.
        log.truncate(10).unwrap();
        assert_eq!(log.append(&mut record()).unwrap(), 5);
        assert_eq!(log.lowest_offset().unwrap(), 5);
        assert!(matches!(
            log.read(4),
            Err(LogError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn log_reader_concatenates_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            segment: SegmentConfig {
                max_store_bytes: 32,
                max_index_bytes: 1024,
                initial_offset: 0,
            },
        };
        let log = Log::open(tmp.path(), config).unwrap();

        let mut want_len = 0u64;
        for i in 0..10u64 {
            let mut rec = Record::new(format!("record-{i}").into_bytes());
            log.append(&mut rec).unwrap();
            want_len += LEN_WIDTH + marshal(&rec).unwrap().len() as u64;
        }

        let mut stream = Vec::new();
        log.reader().unwrap().read_to_end(&mut stream).unwrap();
        assert_eq!(stream.len() as u64, want_len);

        let records = decode_stream(stream.as_slice());
        assert_eq!(records.len(), 10);
        for (i, rec) in records.iter().enumerate() {
            assert_eq!(rec.offset, i as u64);
            assert_eq!(rec.value, format!("record-{i}").into_bytes());
        }
    }

    #[test]
    fn log_reset_clears_records() {
        let tmp = tempfile::tempdir().unwrap();
        let log = Log::open(tmp.path(), Config::default()).unwrap();
        for _ in 0..5 {
            log.append(&mut record()).unwrap();
        }

        log.reset().unwrap();
        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), 0);
        assert!(matches!(
            log.read(0),
            Err(LogError::OffsetOutOfRange { .. })
        ));
        assert_eq!(log.append(&mut record()).unwrap(), 0);
    }

    #[test]
    fn log_remove_deletes_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("log");
        let log = Log::open(&dir, Config::default()).unwrap();
        log.append(&mut record()).unwrap();

        log.remove().unwrap();
        assert!(!dir.exists());
        assert!(log.append(&mut record()).is_err());
    }

    #[test]
    fn log_rejects_invalid_segment_file_name() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("not-a-number.store"), b"").unwrap();

        let err = Log::open(tmp.path(), Config::default()).unwrap_err();
        assert!(matches!(err, LogError::InvalidSegmentName { .. }));
    }

    #[test]
    fn log_ignores_unrelated_files_in_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("README.md"), b"not a segment").unwrap();

        let log = Log::open(tmp.path(), Config::default()).unwrap();
        assert_eq!(log.append(&mut record()).unwrap(), 0);
    }

    #[test]
    fn log_reopen_with_full_tail_rotates_before_append() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            segment: SegmentConfig {
                max_store_bytes: 1024,
                max_index_bytes: ENTRY_WIDTH * 3,
                initial_offset: 0,
            },
        };

        // Build a directory whose only (and therefore last) segment is full,
        // the shape a crash right before rotation leaves behind.
        {
            let mut segment = Segment::open(tmp.path(), 0, config.segment).unwrap();
            for _ in 0..3 {
                segment.append(&mut record()).unwrap();
            }
            segment.close().unwrap();
        }

        let log = Log::open(tmp.path(), config).unwrap();
        assert_eq!(log.append(&mut record()).unwrap(), 3);
        assert_eq!(log.read(3).unwrap().offset, 3);
        assert_eq!(log.read(0).unwrap().offset, 0);
    }
}
