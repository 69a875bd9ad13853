//! Error types for the listing composer
//!
//! - [`SubmissionError`]: one submit attempt failed; session state is kept
//! - [`ComposerError`]: any session operation failed
//! - [`ConfigError`]: configuration could not be loaded

use lc_draft::PersistenceError;
use lc_media::{MediaError, UploadError};
use lc_wizard::{FieldKey, ValidationError, WizardError};
use std::path::PathBuf;

/// Submission failures
///
/// After any of these the wizard, staged media and draft are left as they
/// were so the user can retry without re-entering data.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// A step is missing required fields
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A field value cannot be coerced into the record
    #[error("field {field} is invalid: {reason}")]
    InvalidField {
        /// Offending field
        field: FieldKey,
        /// Why the value was refused
        reason: String,
    },

    /// Staged media did not upload
    #[error("media upload failed: {0}")]
    Upload(#[from] UploadError),

    /// The backend rejected the record
    #[error("record creation failed: {message}")]
    Create {
        /// Message reported by the backend
        message: String,
    },

    /// Submission was abandoned before the record was created
    #[error("submission cancelled")]
    Cancelled,

    /// Another submission for this session is still running
    #[error("a submission is already in progress")]
    AlreadySubmitting,
}

impl SubmissionError {
    /// Check if a plain retry could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upload(e) => !e.is_cancelled(),
            Self::Create { .. } => true,
            _ => false,
        }
    }

    /// Check if the error was detected without any network call
    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidField { .. })
    }
}

/// Session operation failures
#[derive(Debug, thiserror::Error)]
pub enum ComposerError {
    /// Wizard rejected the operation
    #[error(transparent)]
    Wizard(#[from] WizardError),

    /// Step validation failed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Media staging failed
    #[error(transparent)]
    Media(#[from] MediaError),

    /// Draft storage failed
    #[error("draft storage: {0}")]
    Persistence(#[from] PersistenceError),

    /// Submission failed
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// The user declined a confirmation prompt
    #[error("declined: {0}")]
    Declined(String),

    /// No draft stored for this owner
    #[error("no draft to load")]
    NoDraft,

    /// Session was not started or has been cancelled
    #[error("session is not active")]
    NotStarted,
}

impl ComposerError {
    /// Check if the user declined a prompt
    #[inline]
    #[must_use]
    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined(_))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        /// File that was requested
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Not valid TOML for this config
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed but semantically invalid
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Config key
        field: &'static str,
        /// What is wrong with the value
        reason: String,
    },
}
