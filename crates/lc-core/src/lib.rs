//! Listing composer
//!
//! Ties the wizard, media staging, drafts and uploads together:
//! - [`ComposerSession`]: one owner composing one listing, with autosave
//! - [`SubmissionCoordinator`]: validate, upload, create, reconcile
//! - [`RecordAssembler`]: field coercion and category grouping
//! - [`StatusBanner`] and [`EventBus`]: what the user and listeners see
//!
//! # Example
//!
//! ```rust,ignore
//! use lc_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let collaborators = Collaborators::new(
//!     Arc::new(MemoryUploader::new()),
//!     Arc::new(MemoryRecordStore::new()),
//!     Arc::new(MemoryStore::new()),
//! );
//! let session = ComposerSession::new(OwnerId::new("u42"), ComposerConfig::new(), collaborators);
//! session.start().await;
//!
//! session.set_field("title", "Corner office").await?;
//! let receipt = session.submit(&CancellationToken::new()).await?;
//! println!("created {}", receipt.record_id);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod banner;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod memory;
pub mod record;
pub mod session;

pub use banner::{Notice, StatusBanner};
pub use collaborators::{Confirm, CreateFailure, RecordCreator};
pub use config::{ComposerConfig, UploadConfig};
pub use coordinator::{SessionState, SubmissionCoordinator, SubmissionReceipt};
pub use error::{ComposerError, ConfigError, SubmissionError};
pub use events::{ComposerEvent, EventBus, EVENT_CAPACITY};
pub use memory::{AutoConfirm, MemoryRecordStore, MemoryUploader};
pub use record::{CategoryRule, RecordAssembler, RecordId, RecordRules, SubmissionRecord};
pub use session::{Collaborators, ComposerSession};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for composing listings
    pub use crate::{
        AutoConfirm, Collaborators, ComposerConfig, ComposerError, ComposerEvent,
        ComposerSession, MemoryRecordStore, MemoryUploader, Notice, SubmissionError,
        SubmissionReceipt,
    };
    pub use lc_draft::{FileStore, MemoryStore};
    pub use lc_media::{CancellationToken, OwnerId, SourceFile, UploadPolicy};
    pub use lc_wizard::{FieldValue, StepId};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
