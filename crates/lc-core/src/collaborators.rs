//! External capabilities consumed by the composer

use crate::record::{RecordId, SubmissionRecord};
use async_trait::async_trait;
use lc_media::OwnerId;

/// Backend rejection of a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CreateFailure {
    /// Backend message, shown to the user as is
    pub message: String,
}

impl CreateFailure {
    /// Create failure
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Record creation capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordCreator: Send + Sync {
    /// Create `record` for `owner`, returning its new id
    async fn create(&self, owner: &OwnerId, record: &SubmissionRecord) -> Result<RecordId, CreateFailure>;
}

/// Blocking yes/no prompt
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Confirm: Send + Sync {
    /// Ask the user; `true` means go ahead
    async fn confirm(&self, message: &str) -> bool;
}
