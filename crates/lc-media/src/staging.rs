//! Media staging area
//!
//! Files the user picked but has not committed yet. Order is the user's
//! staging order and is preserved all the way into the final record, so
//! the first entry ends up as the primary image.

use crate::error::MediaError;
use crate::preview::{PreviewHandle, PreviewProvider};
use crate::types::{LocalId, MediaReference, SourceFile, UploadJob};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One staged file
#[derive(Debug)]
pub struct StagedMedia {
    /// Session-unique id
    pub id: LocalId,
    /// Picked file
    pub source: SourceFile,
    preview: PreviewHandle,
    uploaded: Option<MediaReference>,
}

impl StagedMedia {
    /// Preview handle for display
    #[inline]
    #[must_use]
    pub fn preview_url(&self) -> &str {
        self.preview.url()
    }

    /// Reference from an earlier partial upload, if kept
    #[inline]
    #[must_use]
    pub fn uploaded(&self) -> Option<&MediaReference> {
        self.uploaded.as_ref()
    }
}

/// Serializable reference to a staged file, stored in drafts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedMediaRef {
    /// Staging id
    pub local_id: LocalId,
    /// Picked file
    pub source: SourceFile,
    /// Reference from an earlier partial upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<MediaReference>,
}

/// Ordered set of staged files with their previews
pub struct MediaStagingArea {
    provider: Arc<dyn PreviewProvider>,
    entries: Vec<StagedMedia>,
}

impl MediaStagingArea {
    /// Create empty staging area
    #[must_use]
    pub fn new(provider: Arc<dyn PreviewProvider>) -> Self {
        Self {
            provider,
            entries: Vec::new(),
        }
    }

    /// Stage a file, creating its preview
    ///
    /// # Errors
    /// `MediaError::PreviewFailed` if the provider rejects the file
    pub fn stage(&mut self, file: SourceFile) -> Result<LocalId, MediaError> {
        self.stage_with_id(LocalId::new(), file, None)
    }

    /// Stage a file under a known id (restoring a draft)
    ///
    /// # Errors
    /// - `MediaError::DuplicateId` if `id` is already staged
    /// - `MediaError::PreviewFailed` if the provider rejects the file
    pub fn stage_with_id(
        &mut self,
        id: LocalId,
        file: SourceFile,
        uploaded: Option<MediaReference>,
    ) -> Result<LocalId, MediaError> {
        if self.position(id).is_some() {
            return Err(MediaError::DuplicateId(id));
        }

        let preview = PreviewHandle::create(Arc::clone(&self.provider), &file)?;
        tracing::debug!(%id, name = %file.name, "staged media");
        self.entries.push(StagedMedia {
            id,
            source: file,
            preview,
            uploaded,
        });
        Ok(id)
    }

    /// Restore entries from draft references
    ///
    /// Entries whose preview cannot be created are skipped and returned.
    pub fn restore(&mut self, refs: Vec<StagedMediaRef>) -> Vec<(StagedMediaRef, MediaError)> {
        self.clear();
        let mut rejected = Vec::new();
        for r in refs {
            if let Err(e) = self.stage_with_id(r.local_id, r.source.clone(), r.uploaded.clone()) {
                tracing::warn!(id = %r.local_id, error = %e, "could not restore staged media");
                rejected.push((r, e));
            }
        }
        rejected
    }

    /// Remove an entry; its preview is revoked when the entry drops
    ///
    /// The returned reference carries any kept upload, which nothing else
    /// points at any more.
    ///
    /// # Errors
    /// `MediaError::NotStaged` if `id` is unknown
    pub fn unstage(&mut self, id: LocalId) -> Result<StagedMediaRef, MediaError> {
        let idx = self.position(id).ok_or(MediaError::NotStaged(id))?;
        let entry = self.entries.remove(idx);
        tracing::debug!(%id, name = %entry.source.name, "unstaged media");
        Ok(StagedMediaRef {
            local_id: entry.id,
            source: entry.source,
            uploaded: entry.uploaded,
        })
    }

    /// Entries in staging order
    #[inline]
    #[must_use]
    pub fn list(&self) -> &[StagedMedia] {
        &self.entries
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is staged
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draft references in staging order
    #[must_use]
    pub fn refs(&self) -> Vec<StagedMediaRef> {
        self.entries
            .iter()
            .map(|e| StagedMediaRef {
                local_id: e.id,
                source: e.source.clone(),
                uploaded: e.uploaded.clone(),
            })
            .collect()
    }

    /// Upload jobs for entries without a kept reference
    #[must_use]
    pub fn pending_jobs(&self) -> Vec<UploadJob> {
        self.entries
            .iter()
            .filter(|e| e.uploaded.is_none())
            .map(|e| UploadJob {
                id: e.id,
                source: e.source.clone(),
            })
            .collect()
    }

    /// Record a kept reference for an entry
    ///
    /// Returns false if the entry is gone.
    pub fn mark_uploaded(&mut self, id: LocalId, reference: MediaReference) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.uploaded = Some(reference);
                true
            }
            None => false,
        }
    }

    /// Kept reference for an entry
    #[must_use]
    pub fn uploaded_ref(&self, id: LocalId) -> Option<&MediaReference> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.uploaded.as_ref())
    }

    /// Detach every kept reference, leaving the entries pending again
    pub fn take_uploaded(&mut self) -> Vec<(LocalId, MediaReference)> {
        self.entries
            .iter_mut()
            .filter_map(|e| e.uploaded.take().map(|r| (e.id, r)))
            .collect()
    }

    /// Release every entry and its preview
    ///
    /// Kept references are dropped with the entries; take them first with
    /// [`MediaStagingArea::take_uploaded`] if they are not owned elsewhere.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(count = self.entries.len(), "releasing staged media");
        }
        self.entries.clear();
    }

    fn position(&self, id: LocalId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}

impl std::fmt::Debug for MediaStagingArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStagingArea")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}
