//! `seglog`: an append-only, offset-addressable record log persisted as a
//! directory of segment files.
//!
//! Scope:
//! - length-prefixed store files (`store`)
//! - fixed-width memory-mapped offset indexes (`index`)
//! - segment pairing, fullness, and rotation (`segment`)
//! - the multi-segment log with truncation and bulk reads (`log`, `reader`)
//!
//! Non-goal: replication, retention policy, or a network surface. Those
//! belong to the commit-log service built on top; this crate provides the
//! raw durable ordering they consume.
//!
//! ## Contract (what you can rely on)
//!
//! - **Ordering**: append order equals offset order equals on-disk order
//!   within a segment's store file. Offsets are assigned contiguously,
//!   starting at `Config::segment.initial_offset` in a fresh directory.
//! - **Visibility vs durability**: a successful [`Log::append`] is visible
//!   to readers of the same process immediately. It is guaranteed on stable
//!   storage only after [`Log::close`], which syncs each index mapping and
//!   file; there is no per-append fsync.
//! - **Crash posture**: on reopen, each segment's index high-water mark
//!   decides which records exist. A store tail left unindexed by a crash
//!   between the store write and the index write is truncated away.
//!
//! Terminology:
//! - An *offset* is a logical record id; a *position* is a byte offset
//!   inside a store file. The index maps one to the other.
//!
//! ## Example
//!
//! ```no_run
//! use seglog::{Config, Log, Record};
//!
//! # fn main() -> seglog::LogResult<()> {
//! let log = Log::open("/var/lib/mylog", Config::default())?;
//! let mut record = Record::new(b"hello world".to_vec());
//! let offset = log.append(&mut record)?;
//! let got = log.read(offset)?;
//! assert_eq!(got.value, b"hello world");
//! log.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod index;
mod log;
mod reader;
mod record;
mod segment;
mod store;

pub use config::{Config, SegmentConfig};
pub use error::{LogError, LogResult};
pub use log::Log;
pub use reader::LogReader;
pub use record::{marshal, unmarshal, Record};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_appends_and_reads_keep_offsets_contiguous() {
        let tmp = tempfile::tempdir().unwrap();
        let log = Arc::new(Log::open(tmp.path(), Config::default()).unwrap());

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    let mut offsets = Vec::new();
                    for i in 0..25u32 {
                        let mut record = Record::new(format!("w{w}-{i}").into_bytes());
                        offsets.push(log.append(&mut record).unwrap());
                    }
                    offsets
                })
            })
            .collect();

        let mut all: Vec<u64> = writers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        let want: Vec<u64> = (0..100).collect();
        assert_eq!(all, want);

        // Every offset reads back with the offset it was assigned.
        for offset in 0..100u64 {
            assert_eq!(log.read(offset).unwrap().offset, offset);
        }
        log.close().unwrap();
    }
}
