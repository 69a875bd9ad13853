//! Composer session
//!
//! One owner composing one listing. The session owns the wizard, the staged
//! media, the autosave task and the gate fencing it. Ending the session
//! (`cancel`, or dropping it) stops autosave and releases every preview.

use crate::banner::StatusBanner;
use crate::collaborators::{Confirm, RecordCreator};
use crate::config::ComposerConfig;
use crate::coordinator::{SessionState, SubmissionCoordinator, SubmissionReceipt};
use crate::error::ComposerError;
use crate::events::ComposerEvent;
use crate::memory::AutoConfirm;
use async_trait::async_trait;
use lc_draft::{
    Autosave, AutosaveHandle, AutosaveStats, DraftSnapshot, DraftStore, DraftSummary,
    KeyValueStore, PersistenceError, SessionGate, SnapshotProvider,
};
use lc_media::{
    LocalId, LocalPreviews, MediaReference, MediaUploader, OwnerId, PreviewProvider, SourceFile, StagedMediaRef,
};
use lc_wizard::{FieldKey, FieldValue, Navigation, StepId, StepValidation, ValidationError, WizardSchema, WizardSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

const LOAD_PROMPT: &str = "Loading the saved draft replaces what you have entered. Continue?";
const CLEAR_PROMPT: &str = "Discard the saved draft and start over?";

/// External capabilities a session needs
pub struct Collaborators {
    /// Remote media store
    pub uploader: Arc<dyn MediaUploader>,
    /// Record backend
    pub creator: Arc<dyn RecordCreator>,
    /// Draft storage
    pub store: Arc<dyn KeyValueStore>,
    /// Preview handles for staged files
    pub previews: Arc<dyn PreviewProvider>,
    /// Yes/no prompt
    pub confirm: Arc<dyn Confirm>,
}

impl Collaborators {
    /// Local previews and a prompt that always agrees
    #[must_use]
    pub fn new(
        uploader: Arc<dyn MediaUploader>,
        creator: Arc<dyn RecordCreator>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            uploader,
            creator,
            store,
            previews: Arc::new(LocalPreviews::new()),
            confirm: Arc::new(AutoConfirm(true)),
        }
    }

    /// With preview provider
    #[must_use]
    pub fn with_previews(mut self, previews: Arc<dyn PreviewProvider>) -> Self {
        self.previews = previews;
        self
    }

    /// With confirmation prompt
    #[must_use]
    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }
}

/// Autosave view of the session state
struct SessionSnapshots {
    state: Arc<Mutex<SessionState>>,
}

#[async_trait]
impl SnapshotProvider for SessionSnapshots {
    async fn snapshot(&self) -> Option<DraftSnapshot> {
        // Busy means a submit or load is rewriting the state; the next tick saves
        let state = self.state.try_lock().ok()?;
        state.wizard.has_content().then(|| state.snapshot())
    }
}

/// A listing being composed by one owner
pub struct ComposerSession {
    owner: OwnerId,
    config: ComposerConfig,
    state: Arc<Mutex<SessionState>>,
    gate: SessionGate,
    drafts: Arc<DraftStore>,
    coordinator: SubmissionCoordinator,
    confirm: Arc<dyn Confirm>,
    autosave: parking_lot::Mutex<Option<AutosaveHandle>>,
    active: AtomicBool,
}

impl ComposerSession {
    /// Create session for `owner` with the default listing schema
    #[must_use]
    pub fn new(owner: OwnerId, config: ComposerConfig, collaborators: Collaborators) -> Self {
        Self::with_schema(owner, config, Arc::new(WizardSchema::listing()), collaborators)
    }

    /// Create session with a custom schema
    #[must_use]
    pub fn with_schema(
        owner: OwnerId,
        config: ComposerConfig,
        schema: Arc<WizardSchema>,
        collaborators: Collaborators,
    ) -> Self {
        let drafts = Arc::new(
            DraftStore::new(collaborators.store).with_prefix(config.draft_key_prefix.clone()),
        );
        let state = SessionState::new(schema, collaborators.previews);
        let gate = state.gate.clone();
        let coordinator = SubmissionCoordinator::new(
            collaborators.uploader,
            collaborators.creator,
            Arc::clone(&drafts),
            &config,
        );

        Self {
            owner,
            config,
            state: Arc::new(Mutex::new(state)),
            gate,
            drafts,
            coordinator,
            confirm: collaborators.confirm,
            autosave: parking_lot::Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Owner of this session
    #[inline]
    #[must_use]
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Banner notices are shown on
    #[inline]
    #[must_use]
    pub fn banner(&self) -> &StatusBanner {
        self.coordinator.banner()
    }

    /// Draft store used by this session
    #[inline]
    #[must_use]
    pub fn drafts(&self) -> &Arc<DraftStore> {
        &self.drafts
    }

    /// Whether the session is started and not cancelled
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Start the session and its autosave task
    ///
    /// Returns the summary of a stored draft so the caller can offer to
    /// resume it. Starting an active session only re-reads the summary. A
    /// draft that cannot be read is reported on the banner and treated as
    /// absent.
    pub async fn start(&self) -> Option<DraftSummary> {
        if !self.active.swap(true, Ordering::AcqRel) {
            self.gate.reopen().await;

            let banner = self.banner().clone();
            let on_failure = Arc::new(move |e: &PersistenceError| {
                banner.warning(format!("Draft could not be saved: {e}"));
            });
            let handle = Autosave::new(
                Arc::clone(&self.drafts),
                self.owner.clone(),
                Arc::new(SessionSnapshots {
                    state: Arc::clone(&self.state),
                }),
            )
            .interval(self.config.autosave_interval())
            .gate(self.gate.clone())
            .on_failure(on_failure)
            .spawn();

            *self.autosave.lock() = Some(handle);
            tracing::info!(owner = %self.owner, "composer session started");
        }

        match self.drafts.summary(&self.owner).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(owner = %self.owner, error = %e, "stored draft is unreadable");
                self.banner().warning(format!("Saved draft could not be read: {e}"));
                None
            }
        }
    }

    /// Set one field
    ///
    /// # Errors
    /// `ComposerError::Wizard` for unknown fields or mismatched values
    pub async fn set_field(
        &self,
        key: impl Into<FieldKey>,
        value: impl Into<FieldValue>,
    ) -> Result<(), ComposerError> {
        self.ensure_active()?;
        self.state.lock().await.wizard.set_field(key, value)?;
        Ok(())
    }

    /// Advance if the current step validates
    ///
    /// # Errors
    /// `ComposerError::Validation` naming the missing fields
    pub async fn go_next(&self) -> Result<StepId, ComposerError> {
        self.ensure_active()?;
        Ok(self.state.lock().await.wizard.go_next()?)
    }

    /// Go back one step
    ///
    /// # Errors
    /// `ComposerError::NotStarted` outside an active session
    pub async fn go_previous(&self) -> Result<StepId, ComposerError> {
        self.ensure_active()?;
        Ok(self.state.lock().await.wizard.go_previous())
    }

    /// Jump to any step without validation
    ///
    /// # Errors
    /// `ComposerError::Wizard` if `step` is out of range
    pub async fn jump_to(&self, step: StepId) -> Result<StepId, ComposerError> {
        self.ensure_active()?;
        Ok(self.state.lock().await.wizard.jump_to(step)?)
    }

    /// Stage a file
    ///
    /// # Errors
    /// `ComposerError::Media` if no preview could be created
    pub async fn stage(&self, file: SourceFile) -> Result<LocalId, ComposerError> {
        self.ensure_active()?;
        Ok(self.state.lock().await.media.stage(file)?)
    }

    /// Remove a staged file and release its preview
    ///
    /// An upload kept from an earlier attempt is deleted remotely.
    ///
    /// # Errors
    /// `ComposerError::Media` if `id` is not staged
    pub async fn unstage(&self, id: LocalId) -> Result<SourceFile, ComposerError> {
        self.ensure_active()?;
        let removed = self.state.lock().await.media.unstage(id)?;
        if let Some(reference) = removed.uploaded {
            self.coordinator.discard_uploads(&[(id, reference)], &self.owner).await;
        }
        Ok(removed.source)
    }

    /// Current step
    pub async fn current_step(&self) -> StepId {
        self.state.lock().await.wizard.current_step()
    }

    /// Step and field values
    pub async fn wizard_snapshot(&self) -> WizardSnapshot {
        self.state.lock().await.wizard.snapshot()
    }

    /// Validation of every step
    pub async fn step_validity(&self) -> Vec<StepValidation> {
        self.state.lock().await.wizard.step_validity()
    }

    /// Navigation moves currently on offer
    pub async fn available_moves(&self) -> Vec<(Navigation, StepId)> {
        self.state.lock().await.wizard.available_moves()
    }

    /// Error shown by the last failed `go_next`
    pub async fn last_error(&self) -> Option<ValidationError> {
        self.state.lock().await.wizard.last_error().cloned()
    }

    /// Staged files in staging order
    pub async fn staged(&self) -> Vec<StagedMediaRef> {
        self.state.lock().await.media.refs()
    }

    /// Save the draft now, whether or not anything was entered
    ///
    /// # Errors
    /// `ComposerError::Persistence` if the store rejects the write
    pub async fn save_draft(&self) -> Result<DraftSummary, ComposerError> {
        self.ensure_active()?;
        let snapshot = self.state.lock().await.snapshot();
        Ok(self.drafts.save(&self.owner, snapshot).await?)
    }

    /// Replace the in-memory state with the stored draft
    ///
    /// Asks for confirmation first when anything has been entered. Staged
    /// files whose preview can no longer be created are dropped with a
    /// warning on the banner.
    ///
    /// # Errors
    /// - `ComposerError::NoDraft` if nothing is stored
    /// - `ComposerError::Declined` if the user said no
    /// - `ComposerError::Persistence` for unreadable drafts
    pub async fn load_draft(&self) -> Result<DraftSummary, ComposerError> {
        self.ensure_active()?;
        let draft = self
            .drafts
            .load(&self.owner)
            .await?
            .ok_or(ComposerError::NoDraft)?;

        let has_content = self.state.lock().await.wizard.has_content();
        if has_content && !self.confirm.confirm(LOAD_PROMPT).await {
            tracing::debug!(owner = %self.owner, "draft load declined");
            return Err(ComposerError::Declined("load draft".to_string()));
        }

        let summary = draft.summary();
        let snapshot = draft.into_snapshot();
        let (rejected, orphaned) = {
            let mut state = self.state.lock().await;
            let previous = state.media.take_uploaded();
            state.wizard.restore(snapshot.wizard);
            let rejected = state.media.restore(snapshot.staged_media);

            let mut orphaned: Vec<(LocalId, MediaReference)> = previous
                .into_iter()
                .filter(|(_, r)| !state.media.list().iter().any(|e| e.uploaded() == Some(r)))
                .collect();
            for (entry, _) in &rejected {
                if let Some(reference) = &entry.uploaded {
                    if !orphaned.iter().any(|(_, r)| r == reference) {
                        orphaned.push((entry.local_id, reference.clone()));
                    }
                }
            }
            (rejected, orphaned)
        };
        self.coordinator.discard_uploads(&orphaned, &self.owner).await;
        if !rejected.is_empty() {
            self.banner()
                .warning(format!("{} staged file(s) could not be restored", rejected.len()));
        }

        tracing::info!(owner = %self.owner, step = %summary.current_step, "draft loaded");
        Ok(summary)
    }

    /// Delete the stored draft and start the form over
    ///
    /// Uploads kept from an earlier attempt are deleted remotely.
    ///
    /// # Errors
    /// - `ComposerError::Declined` if the user said no
    /// - `ComposerError::Persistence` if the store rejects the removal
    pub async fn clear_draft(&self) -> Result<(), ComposerError> {
        self.ensure_active()?;
        if !self.confirm.confirm(CLEAR_PROMPT).await {
            tracing::debug!(owner = %self.owner, "draft clear declined");
            return Err(ComposerError::Declined("clear draft".to_string()));
        }

        let (cleared, kept) = {
            let mut state = self.state.lock().await;
            let _hold = self.gate.hold().await;
            match self.drafts.clear(&self.owner).await {
                Ok(()) => {
                    let kept = state.media.take_uploaded();
                    state.reset();
                    (Ok(()), kept)
                }
                Err(e) => (Err(e), Vec::new()),
            }
        };
        self.coordinator.discard_uploads(&kept, &self.owner).await;

        cleared?;
        tracing::info!(owner = %self.owner, "draft cleared");
        Ok(())
    }

    /// Submit the listing
    ///
    /// # Errors
    /// `ComposerError::Submission`; session state is kept for a retry
    pub async fn submit(&self, cancel: &CancellationToken) -> Result<SubmissionReceipt, ComposerError> {
        self.ensure_active()?;
        Ok(self.coordinator.submit(&self.state, &self.owner, cancel).await?)
    }

    /// End the session without submitting
    ///
    /// Stops autosave, releases previews and resets the wizard. The stored
    /// draft is kept so the listing can be resumed later. Returns the
    /// autosave counters, or `None` if the session was not active.
    pub async fn cancel(&self) -> Option<AutosaveStats> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return None;
        }

        self.gate.close().await;
        let handle = self.autosave.lock().take();
        let stats = match handle {
            Some(handle) => handle.cancel().await,
            None => AutosaveStats::default(),
        };

        self.state.lock().await.reset();
        self.banner().dismiss();
        tracing::info!(owner = %self.owner, saves = stats.saves, "composer session cancelled");
        Some(stats)
    }

    /// Listen for record-created events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ComposerEvent> {
        self.coordinator.events().subscribe()
    }

    /// Autosave counters so far
    #[must_use]
    pub fn autosave_stats(&self) -> Option<AutosaveStats> {
        self.autosave.lock().as_ref().map(AutosaveHandle::stats)
    }

    fn ensure_active(&self) -> Result<(), ComposerError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ComposerError::NotStarted)
        }
    }
}

impl std::fmt::Debug for ComposerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposerSession")
            .field("owner", &self.owner)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockConfirm;
    use crate::memory::{MemoryRecordStore, MemoryUploader};
    use lc_draft::MemoryStore;
    use std::time::Duration;

    fn session_with(confirm: Arc<dyn Confirm>) -> ComposerSession {
        let collab = Collaborators::new(
            Arc::new(MemoryUploader::new()),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryStore::new()),
        )
        .with_confirm(confirm);
        let config = ComposerConfig::default().with_autosave_interval(Duration::from_millis(100));
        ComposerSession::new(OwnerId::new("u42"), config, collab)
    }

    #[tokio::test]
    async fn operations_require_start() {
        let session = session_with(Arc::new(AutoConfirm(true)));
        assert!(matches!(
            session.set_field("title", "X").await,
            Err(ComposerError::NotStarted)
        ));
        assert_eq!(session.start().await, None);
        assert!(session.set_field("title", "X").await.is_ok());
    }

    #[tokio::test]
    async fn load_asks_before_overwriting_and_respects_no() {
        let mut confirm = MockConfirm::new();
        confirm
            .expect_confirm()
            .withf(|m| m.starts_with("Loading the saved draft"))
            .times(1)
            .returning(|_| false);
        let session = session_with(Arc::new(confirm));
        session.start().await;

        session.set_field("title", "Saved title").await.unwrap();
        session.save_draft().await.unwrap();
        session.set_field("title", "Newer title").await.unwrap();

        let err = session.load_draft().await.unwrap_err();
        assert!(err.is_declined());
        let snap = session.wizard_snapshot().await;
        assert_eq!(snap.fields.get("title"), Some(&FieldValue::text("Newer title")));
    }

    #[tokio::test]
    async fn load_into_empty_wizard_needs_no_prompt() {
        let mut confirm = MockConfirm::new();
        confirm.expect_confirm().never();
        let session = session_with(Arc::new(confirm));
        session.start().await;

        session.set_field("title", "X").await.unwrap();
        session.jump_to(StepId(3)).await.unwrap();
        session.save_draft().await.unwrap();

        // A second session for the same owner resumes from the shared store
        let drafts = Arc::clone(session.drafts());
        let draft = drafts.load(&OwnerId::new("u42")).await.unwrap().unwrap();
        assert_eq!(draft.current_step, StepId(3));

        session.cancel().await;
        session.start().await;
        assert_eq!(session.current_step().await, StepId::FIRST);
        let summary = session.load_draft().await.unwrap();
        assert_eq!(summary.current_step, StepId(3));
        assert_eq!(session.current_step().await, StepId(3));
    }

    #[tokio::test]
    async fn clear_requires_confirmation() {
        let session = session_with(Arc::new(AutoConfirm(false)));
        session.start().await;
        session.set_field("title", "X").await.unwrap();
        session.save_draft().await.unwrap();

        assert!(session.clear_draft().await.unwrap_err().is_declined());
        assert!(session.drafts().exists(session.owner()).await.unwrap());
    }

    #[tokio::test]
    async fn moves_follow_the_current_step() {
        let session = session_with(Arc::new(AutoConfirm(true)));
        session.start().await;
        assert!(!session
            .available_moves()
            .await
            .contains(&(Navigation::Next, StepId(2))));

        session.set_field("title", "X").await.unwrap();
        session.set_field("category", "office").await.unwrap();
        session.set_field("listing_type", "rent").await.unwrap();
        assert!(session
            .available_moves()
            .await
            .contains(&(Navigation::Next, StepId(2))));
    }

    #[tokio::test]
    async fn missing_draft_is_reported() {
        let session = session_with(Arc::new(AutoConfirm(true)));
        session.start().await;
        assert!(matches!(session.load_draft().await, Err(ComposerError::NoDraft)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_autosave_and_keeps_draft() {
        let session = session_with(Arc::new(AutoConfirm(true)));
        session.start().await;
        session.set_field("title", "X").await.unwrap();
        session
            .stage(SourceFile::new("/pics/a.jpg", "image/jpeg", 1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        let stats = session.cancel().await.unwrap();
        assert!(stats.saves >= 2);

        assert!(session.drafts().exists(session.owner()).await.unwrap());
        assert!(session.staged().await.is_empty());
        assert!(!session.is_active());
        assert!(session.cancel().await.is_none());
    }
}
