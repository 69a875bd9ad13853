//! Submission coordinator
//!
//! Drives one submit attempt:
//! 1. validate every step and dry-run record assembly (no network)
//! 2. upload staged media, strictly before the create call
//! 3. assemble the record and hand it to the [`RecordCreator`]
//! 4. on success clear the draft, reset the wizard, release media and
//!    broadcast `RecordCreated`
//!
//! Any failure leaves the wizard, staged media and draft untouched. Uploads
//! made by a failed attempt are deleted again (abort-all) or cached on the
//! staged entries for the next attempt (keep-partial).

use crate::banner::StatusBanner;
use crate::collaborators::RecordCreator;
use crate::config::ComposerConfig;
use crate::error::SubmissionError;
use crate::events::{ComposerEvent, EventBus};
use crate::record::{RecordAssembler, RecordId};
use lc_draft::{DraftSnapshot, DraftStore, SessionGate};
use lc_media::{
    LocalId, MediaReference, MediaStagingArea, MediaUploader, OwnerId, PreviewProvider,
    UploadPipeline, UploadPolicy, UploadResult,
};
use lc_wizard::{StepWizard, WizardSchema};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Everything one composing session holds in memory
#[derive(Debug)]
pub struct SessionState {
    /// Step and field values
    pub wizard: StepWizard,
    /// Staged files
    pub media: MediaStagingArea,
    /// Fence for the session's autosave task
    pub gate: SessionGate,
}

impl SessionState {
    /// Fresh state at step 1 with nothing staged
    #[must_use]
    pub fn new(schema: Arc<WizardSchema>, previews: Arc<dyn PreviewProvider>) -> Self {
        Self {
            wizard: StepWizard::new(schema),
            media: MediaStagingArea::new(previews),
            gate: SessionGate::open(),
        }
    }

    /// Draft snapshot of the current state
    #[must_use]
    pub fn snapshot(&self) -> DraftSnapshot {
        DraftSnapshot {
            wizard: self.wizard.snapshot(),
            staged_media: self.media.refs(),
        }
    }

    /// Back to step 1 with nothing staged; previews are released
    pub fn reset(&mut self) {
        self.wizard.reset();
        self.media.clear();
    }
}

/// What a successful submission produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Created record
    pub record_id: RecordId,
    /// Images attached to the record
    pub images: usize,
    /// Images uploaded by this attempt
    pub uploaded: usize,
    /// Images reused from an earlier partial attempt
    pub reused: usize,
    /// Whether the draft was removed (the record exists either way)
    pub draft_cleared: bool,
}

/// Clears the in-flight flag when the attempt ends
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Orchestrates validate, upload, create and local reconciliation
pub struct SubmissionCoordinator {
    pipeline: UploadPipeline,
    creator: Arc<dyn RecordCreator>,
    drafts: Arc<DraftStore>,
    assembler: RecordAssembler,
    policy: UploadPolicy,
    events: EventBus,
    banner: StatusBanner,
    submitting: AtomicBool,
}

impl SubmissionCoordinator {
    /// Create coordinator from config
    #[must_use]
    pub fn new(
        uploader: Arc<dyn MediaUploader>,
        creator: Arc<dyn RecordCreator>,
        drafts: Arc<DraftStore>,
        config: &ComposerConfig,
    ) -> Self {
        Self {
            pipeline: UploadPipeline::new(uploader).with_concurrency(config.upload.concurrency),
            creator,
            drafts,
            assembler: RecordAssembler::new(config.record.clone()),
            policy: config.upload.policy,
            events: EventBus::new(),
            banner: StatusBanner::new(config.success_notice()),
            submitting: AtomicBool::new(false),
        }
    }

    /// With a shared event bus
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// With a shared banner
    #[must_use]
    pub fn with_banner(mut self, banner: StatusBanner) -> Self {
        self.banner = banner;
        self
    }

    /// Event bus `RecordCreated` goes to
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Banner notices go to
    #[inline]
    #[must_use]
    pub fn banner(&self) -> &StatusBanner {
        &self.banner
    }

    /// Upload batch policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> UploadPolicy {
        self.policy
    }

    /// Whether a submission is running
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Submit the session's listing for `owner`
    ///
    /// Holds the state lock for the whole attempt; an autosave tick that
    /// finds the state busy skips instead of saving half-reset state.
    ///
    /// # Errors
    /// - `SubmissionError::AlreadySubmitting` while another attempt runs
    /// - `SubmissionError::Validation` / `InvalidField` before any upload
    /// - `SubmissionError::Upload` if staged media did not upload
    /// - `SubmissionError::Create` with the backend message
    /// - `SubmissionError::Cancelled` if `cancel` fired before creation
    pub async fn submit(
        &self,
        state: &Mutex<SessionState>,
        owner: &OwnerId,
        cancel: &CancellationToken,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let Some(_flight) = InFlight::acquire(&self.submitting) else {
            tracing::debug!(%owner, "submit rejected: already submitting");
            return Err(SubmissionError::AlreadySubmitting);
        };

        let mut state = state.lock().await;
        tracing::info!(%owner, step = %state.wizard.current_step(), media = state.media.len(), "submitting listing");

        match self.run(&mut state, owner, cancel).await {
            Ok(receipt) => {
                tracing::info!(%owner, record_id = %receipt.record_id, images = receipt.images, "listing submitted");
                self.banner.success("Listing created");
                Ok(receipt)
            }
            Err(SubmissionError::Cancelled) => {
                tracing::info!(%owner, "submission cancelled");
                self.banner.warning("Submission cancelled");
                Err(SubmissionError::Cancelled)
            }
            Err(e) => {
                if e.is_local() {
                    tracing::debug!(%owner, error = %e, "submission rejected locally");
                } else {
                    tracing::error!(%owner, error = %e, "submission failed");
                }
                self.banner.error(e.to_string());
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        state: &mut SessionState,
        owner: &OwnerId,
        cancel: &CancellationToken,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        state.wizard.validate_all()?;
        self.assembler.check(state.wizard.get_all_fields())?;
        if cancel.is_cancelled() {
            return Err(SubmissionError::Cancelled);
        }

        let reused = state.media.len() - state.media.pending_jobs().len();
        let (uploads, fresh) = self.upload(state, owner, cancel).await?;

        let record = match self.assembler.assemble(state.wizard.get_all_fields(), &uploads) {
            Ok(record) => record,
            Err(e) => {
                self.release(state, &fresh, owner).await;
                return Err(e);
            }
        };
        if cancel.is_cancelled() {
            self.release(state, &fresh, owner).await;
            return Err(SubmissionError::Cancelled);
        }

        tracing::debug!(%owner, images = record.images.len(), "creating record");
        let record_id = match self.creator.create(owner, &record).await {
            Ok(id) => id,
            Err(failure) => {
                self.release(state, &fresh, owner).await;
                return Err(SubmissionError::Create {
                    message: failure.message,
                });
            }
        };

        let draft_cleared = self.reconcile(state, owner).await;
        self.events.publish(ComposerEvent::RecordCreated {
            record_id: record_id.clone(),
            owner_id: owner.clone(),
        });

        Ok(SubmissionReceipt {
            record_id,
            images: uploads.len(),
            uploaded: fresh.len(),
            reused,
            draft_cleared,
        })
    }

    /// Upload pending media and line every reference up with staging order
    async fn upload(
        &self,
        state: &mut SessionState,
        owner: &OwnerId,
        cancel: &CancellationToken,
    ) -> Result<(UploadResult, Vec<(LocalId, MediaReference)>), SubmissionError> {
        if state.media.is_empty() {
            return Ok((UploadResult::default(), Vec::new()));
        }

        let jobs = state.media.pending_jobs();
        let report = self.pipeline.upload_each(&jobs, owner, cancel).await;
        let result = match self.pipeline.settle(report, self.policy, owner).await {
            Ok(result) => result,
            Err(e) => {
                for (id, reference) in e.kept() {
                    state.media.mark_uploaded(*id, reference.clone());
                }
                if e.is_cancelled() {
                    return Err(SubmissionError::Cancelled);
                }
                return Err(e.into());
            }
        };

        let fresh: Vec<(LocalId, MediaReference)> = jobs.iter().map(|j| j.id).zip(result.0).collect();
        let ordered = state
            .media
            .list()
            .iter()
            .filter_map(|entry| {
                entry.uploaded().cloned().or_else(|| {
                    fresh
                        .iter()
                        .find(|(id, _)| *id == entry.id)
                        .map(|(_, r)| r.clone())
                })
            })
            .collect();

        Ok((UploadResult(ordered), fresh))
    }

    /// Undo or keep this attempt's uploads after a later step failed
    async fn release(&self, state: &mut SessionState, fresh: &[(LocalId, MediaReference)], owner: &OwnerId) {
        if fresh.is_empty() {
            return;
        }
        match self.policy {
            UploadPolicy::KeepPartial => {
                for (id, reference) in fresh {
                    state.media.mark_uploaded(*id, reference.clone());
                }
                tracing::debug!(%owner, kept = fresh.len(), "uploads kept for retry");
            }
            UploadPolicy::AbortAll => {
                let (deleted, orphaned) = self.pipeline.compensate(fresh, owner).await;
                if !orphaned.is_empty() {
                    tracing::warn!(%owner, deleted, orphaned = orphaned.len(), "some uploads could not be removed");
                }
            }
        }
    }

    /// Local clean-up after the record exists
    ///
    /// The gate is held while the draft is cleared so an autosave tick
    /// that already took its snapshot cannot write it back afterwards. The
    /// hold leaves the open flag alone, so a session that ends meanwhile
    /// stays closed.
    async fn reconcile(&self, state: &mut SessionState, owner: &OwnerId) -> bool {
        let _hold = state.gate.hold().await;

        let cleared = match self.drafts.clear(owner).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%owner, error = %e, "record created but draft could not be cleared");
                false
            }
        };
        state.media.clear();
        state.wizard.reset();
        cleared
    }

    /// Delete kept uploads that no staged entry refers to any more
    pub async fn discard_uploads(&self, kept: &[(LocalId, MediaReference)], owner: &OwnerId) {
        if kept.is_empty() {
            return;
        }
        let (deleted, orphaned) = self.pipeline.compensate(kept, owner).await;
        if orphaned.is_empty() {
            tracing::debug!(%owner, deleted, "discarded kept uploads");
        } else {
            tracing::warn!(%owner, deleted, orphaned = orphaned.len(), "some kept uploads could not be removed");
        }
    }
}

impl std::fmt::Debug for SubmissionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionCoordinator")
            .field("policy", &self.policy)
            .field("submitting", &self.is_submitting())
            .finish_non_exhaustive()
    }
}
