//! Record values and the byte codec used at the store boundary.
//!
//! The log never interprets a record's payload; it only needs a stable byte
//! form to hand to the store. Marshalling goes through postcard so that the
//! `(value, offset)` pair round-trips exactly.

use serde::{Deserialize, Serialize};

use crate::error::{LogError, LogResult};

/// A single log record: an opaque payload plus its assigned absolute offset.
///
/// The offset field is assigned by the log at append time; callers construct
/// records with [`Record::new`] and read the offset back after appending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque payload bytes.
    pub value: Vec<u8>,
    /// Absolute offset assigned at append time.
    pub offset: u64,
}

impl Record {
    /// Create a record with the given payload and an unassigned offset.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            offset: 0,
        }
    }
}

/// Marshal a record into the byte form written to a store file.
pub fn marshal(record: &Record) -> LogResult<Vec<u8>> {
    postcard::to_allocvec(record).map_err(|e| LogError::Encode(e.to_string()))
}

/// Unmarshal a record from bytes previously produced by [`marshal`].
pub fn unmarshal(bytes: &[u8]) -> LogResult<Record> {
    postcard::from_bytes(bytes).map_err(|e| LogError::Decode(e.to_string()))
}
