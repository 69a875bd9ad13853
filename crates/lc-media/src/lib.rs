//! Listing media - local staging and batch upload
//!
//! - [`MediaStagingArea`]: ordered staged files, each owning a preview handle
//! - [`PreviewHandle`]: released exactly once, when its entry drops
//! - [`UploadPipeline`]: per-file outcomes, abort-all or keep-partial batches,
//!   compensating deletes, cancellation
//!
//! # Example
//!
//! ```rust,ignore
//! use lc_media::{LocalPreviews, MediaStagingArea, OwnerId, SourceFile, UploadPipeline};
//! use std::sync::Arc;
//!
//! # async fn example(uploader: Arc<dyn lc_media::MediaUploader>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut staging = MediaStagingArea::new(Arc::new(LocalPreviews::new()));
//! staging.stage(SourceFile::new("/photos/front.jpg", "image/jpeg", 52_000))?;
//!
//! let pipeline = UploadPipeline::new(uploader);
//! let refs = pipeline.upload_all(&staging.pending_jobs(), &OwnerId::new("u42")).await?;
//! println!("primary image: {:?}", refs.primary());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod preview;
pub mod staging;
pub mod types;
pub mod upload;

pub use error::{FailedUpload, MediaError, UploadError, UploadFailure};
pub use preview::{LocalPreviews, PreviewHandle, PreviewProvider, PreviewStats};
pub use staging::{MediaStagingArea, StagedMedia, StagedMediaRef};
pub use types::{LocalId, MediaReference, OwnerId, SourceFile, UploadJob};
pub use upload::{MediaUploader, UploadOutcome, UploadPipeline, UploadPolicy, UploadReport, UploadResult};

/// Re-exported so callers can cancel uploads without a direct dependency
pub use tokio_util::sync::CancellationToken;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
