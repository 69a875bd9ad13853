//! Error types for media staging and upload

use crate::types::{LocalId, MediaReference};

/// Staging area errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// Preview could not be created
    #[error("preview creation failed for {name}: {reason}")]
    PreviewFailed {
        /// File name of the media
        name: String,
        /// Reason given by the preview provider
        reason: String,
    },

    /// Id is not in the staging area
    #[error("media not staged: {0}")]
    NotStaged(LocalId),

    /// Id already used in this session
    #[error("media id already staged: {0}")]
    DuplicateId(LocalId),
}

/// Failure reported by the uploader for one file
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct UploadFailure {
    /// Backend message
    pub message: String,
}

impl UploadFailure {
    /// Create failure
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One file that did not upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    /// Staging id
    pub id: LocalId,
    /// File name for display
    pub name: String,
    /// Backend message
    pub reason: String,
}

/// Batch upload errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// Abort-all: batch voided, stored files deleted where possible
    #[error("{} of the staged files failed to upload", .failed.len())]
    Batch {
        /// Files that failed
        failed: Vec<FailedUpload>,
        /// Already-stored files removed again
        compensated: usize,
        /// Stored files whose deletion also failed
        orphaned: Vec<MediaReference>,
    },

    /// Keep-partial: successful uploads retained for the next attempt
    #[error("{} of the staged files failed to upload ({} kept for retry)", .failed.len(), .kept.len())]
    Partial {
        /// Files that failed
        failed: Vec<FailedUpload>,
        /// Stored files to reuse on retry
        kept: Vec<(LocalId, MediaReference)>,
    },

    /// Cancelled before the batch finished
    #[error("upload cancelled after {completed} file(s)")]
    Cancelled {
        /// Uploads that finished before cancellation
        completed: usize,
        /// Stored files retained (keep-partial only)
        kept: Vec<(LocalId, MediaReference)>,
    },
}

impl UploadError {
    /// Files that failed, empty for cancellation
    #[must_use]
    pub fn failed(&self) -> &[FailedUpload] {
        match self {
            Self::Batch { failed, .. } | Self::Partial { failed, .. } => failed,
            Self::Cancelled { .. } => &[],
        }
    }

    /// References kept for a later retry
    #[must_use]
    pub fn kept(&self) -> &[(LocalId, MediaReference)] {
        match self {
            Self::Partial { kept, .. } | Self::Cancelled { kept, .. } => kept,
            Self::Batch { .. } => &[],
        }
    }

    /// Whether the user abandoned the batch
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_error_display_counts_failures() {
        let err = UploadError::Batch {
            failed: vec![FailedUpload {
                id: LocalId::new(),
                name: "b.jpg".into(),
                reason: "timeout".into(),
            }],
            compensated: 1,
            orphaned: vec![],
        };
        assert_eq!(err.to_string(), "1 of the staged files failed to upload");
        assert!(err.kept().is_empty());
    }
}
