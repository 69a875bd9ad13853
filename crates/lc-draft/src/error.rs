//! Error types for draft persistence

/// Draft save/load/clear failures
///
/// Always reported to the caller. The autosave loop logs and counts them
/// but keeps running.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Backend refused or could not be reached (quota, offline, ...)
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Stored bytes are not a readable draft
    #[error("draft at {key} is corrupt: {reason}")]
    Corrupt {
        /// Storage key of the draft
        key: String,
        /// Decoder message
        reason: String,
    },

    /// Draft written by an incompatible format version
    #[error("draft format version {found} is not supported (expected {expected})")]
    UnsupportedVersion {
        /// Version in the stored draft
        found: u32,
        /// Version this build writes
        expected: u32,
    },

    /// Draft could not be encoded
    #[error("draft serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem backend error
    #[error("draft storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl PersistenceError {
    /// Whether a later attempt could succeed without user action
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}
