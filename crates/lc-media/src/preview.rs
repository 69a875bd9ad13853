//! Preview handles
//!
//! A preview handle is a local resource (an object URL, a thumbnail file,
//! a texture) that must be released exactly once. [`PreviewHandle`] owns
//! that obligation: dropping it revokes the handle, so every path that
//! removes a staged entry releases its preview, error paths included.

use crate::error::MediaError;
use crate::types::SourceFile;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use ulid::Ulid;

/// Creates and revokes preview handles
pub trait PreviewProvider: Send + Sync {
    /// Create a handle for `file`
    ///
    /// # Errors
    /// `MediaError::PreviewFailed` if no preview can be produced
    fn create(&self, file: &SourceFile) -> Result<String, MediaError>;

    /// Release a handle previously returned by `create`
    fn revoke(&self, handle: &str);
}

/// Owned preview handle, revoked on drop
pub struct PreviewHandle {
    url: String,
    provider: Arc<dyn PreviewProvider>,
}

impl PreviewHandle {
    /// Create a handle through `provider`
    ///
    /// # Errors
    /// Propagates the provider's `MediaError`
    pub fn create(provider: Arc<dyn PreviewProvider>, file: &SourceFile) -> Result<Self, MediaError> {
        let url = provider.create(file)?;
        Ok(Self { url, provider })
    }

    /// Handle value for display
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        tracing::trace!(url = %self.url, "revoking preview");
        self.provider.revoke(&self.url);
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle").field("url", &self.url).finish()
    }
}

/// Statistics for preview bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewStats {
    /// Handles currently alive
    pub live: usize,
    /// Handles created so far
    pub created: u64,
    /// Handles revoked so far
    pub revoked: u64,
    /// Revocations of handles that were not alive
    pub double_revokes: u64,
}

/// In-process preview provider producing `preview://` URLs
#[derive(Debug, Default)]
pub struct LocalPreviews {
    inner: Mutex<LocalPreviewsInner>,
}

#[derive(Debug, Default)]
struct LocalPreviewsInner {
    live: HashSet<String>,
    stats: PreviewStats,
}

impl LocalPreviews {
    /// Create provider
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> PreviewStats {
        let inner = self.inner.lock();
        PreviewStats {
            live: inner.live.len(),
            ..inner.stats
        }
    }
}

impl PreviewProvider for LocalPreviews {
    fn create(&self, file: &SourceFile) -> Result<String, MediaError> {
        if file.name.is_empty() {
            return Err(MediaError::PreviewFailed {
                name: file.path.display().to_string(),
                reason: "file has no name".to_string(),
            });
        }

        let url = format!("preview://{}/{}", Ulid::new(), file.name);
        let mut inner = self.inner.lock();
        inner.live.insert(url.clone());
        inner.stats.created += 1;
        Ok(url)
    }

    fn revoke(&self, handle: &str) {
        let mut inner = self.inner.lock();
        if inner.live.remove(handle) {
            inner.stats.revoked += 1;
        } else {
            inner.stats.double_revokes += 1;
            tracing::warn!(handle, "revoke of unknown preview handle");
        }
    }
}
