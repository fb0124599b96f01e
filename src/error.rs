//! Error types for `seglog`.

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors returned by the `seglog` crate.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    /// I/O error (filesystem, mmap, or fsync failure).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// End of valid data.
    ///
    /// Doubles as the "segment is full" signal: a segment append that cannot
    /// fit another index entry fails with this, and the log answers by
    /// rotating to a fresh segment rather than surfacing a failure.
    #[error("end of file")]
    EndOfFile,

    /// A read was requested for an offset no segment contains.
    #[error("offset out of range: {offset}")]
    OffsetOutOfRange {
        /// The absolute offset that was requested.
        offset: u64,
    },

    /// A segment file's name is not a valid decimal base offset.
    #[error("invalid segment file name: {name:?}")]
    InvalidSegmentName {
        /// The offending file name.
        name: String,
    },

    /// Format error (corrupt, unexpected, unsupported on-disk data).
    #[error("format error: {0}")]
    Format(String),

    /// Encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid state (operation not allowed in current state).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Lock acquisition failed because a previous holder panicked.
    #[error("lock poisoned on {0}")]
    LockPoisoned(&'static str),
}
