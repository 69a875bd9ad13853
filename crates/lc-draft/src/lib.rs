//! Listing drafts - persist in-progress wizard work
//!
//! - [`DraftStore`]: one draft per owner over an injected [`KeyValueStore`]
//! - [`MemoryStore`] / [`FileStore`]: backends
//! - [`Autosave`]: recurring save task with a cancellation handle, fenced by
//!   a [`SessionGate`] so no write lands after the session ends
//!
//! # Example
//!
//! ```rust,ignore
//! use lc_draft::{DraftStore, MemoryStore};
//! use lc_media::OwnerId;
//! use std::sync::Arc;
//!
//! # async fn example(snapshot: lc_draft::DraftSnapshot) -> Result<(), lc_draft::PersistenceError> {
//! let store = DraftStore::new(Arc::new(MemoryStore::new()));
//! let owner = OwnerId::new("u42");
//!
//! store.save(&owner, snapshot).await?;
//! if let Some(draft) = store.load(&owner).await? {
//!     println!("resume at step {}", draft.current_step);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod autosave;
pub mod draft;
pub mod error;
pub mod store;

pub use autosave::{Autosave, AutosaveHandle, AutosaveStats, FailureHook, GateHold, GatePass, SessionGate, SnapshotProvider};
pub use draft::{Draft, DraftSnapshot, DraftStore, DraftSummary, DEFAULT_KEY_PREFIX, DRAFT_FORMAT_VERSION};
pub use error::PersistenceError;
pub use store::{FileStore, KeyValueStore, MemoryStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
