//! Upload pipeline
//!
//! Turns staged files into durable references through an injected
//! [`MediaUploader`]. Uploads produce per-file tagged outcomes
//! ([`UploadReport`]); a [`UploadPolicy`] then decides what the batch means:
//!
//! - `AbortAll`: any failure voids the batch. References already stored
//!   remotely are deleted again so nothing is orphaned.
//! - `KeepPartial`: failures void the batch, but stored references are
//!   handed back so a retry only uploads the files that failed.
//!
//! Results always follow the order of the input jobs.

use crate::error::{FailedUpload, UploadError, UploadFailure};
use crate::types::{LocalId, MediaReference, OwnerId, UploadJob};
use async_trait::async_trait;
use futures::stream::{FuturesOrdered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// External upload capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Store one file durably for `owner`
    async fn upload(&self, owner: &OwnerId, job: &UploadJob) -> Result<MediaReference, UploadFailure>;

    /// Remove a stored file (compensation after an aborted batch)
    async fn delete(&self, owner: &OwnerId, reference: &MediaReference) -> Result<(), UploadFailure>;
}

/// Batch failure policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPolicy {
    /// Any failure voids the batch; stored files are deleted again
    #[default]
    AbortAll,
    /// Any failure voids the batch; stored files are kept for retry
    KeepPartial,
}

/// Ordered durable references, one per staged file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadResult(pub Vec<MediaReference>);

impl UploadResult {
    /// References in staging order
    #[inline]
    #[must_use]
    pub fn references(&self) -> &[MediaReference] {
        &self.0
    }

    /// Number of references
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no references
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First reference (the primary image)
    #[inline]
    #[must_use]
    pub fn primary(&self) -> Option<&MediaReference> {
        self.0.first()
    }
}

/// Outcome for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Staging id
    pub id: LocalId,
    /// File name for display
    pub name: String,
    /// Stored reference or failure
    pub result: Result<MediaReference, UploadFailure>,
}

/// Per-file outcomes of one batch, in job order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Outcomes for every job that finished
    pub outcomes: Vec<UploadOutcome>,
    /// Jobs submitted
    pub requested: usize,
    /// Batch stopped by cancellation
    pub cancelled: bool,
}

impl UploadReport {
    /// Every job finished and succeeded
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        !self.cancelled
            && self.outcomes.len() == self.requested
            && self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Stored references with their staging ids
    #[must_use]
    pub fn succeeded(&self) -> Vec<(LocalId, MediaReference)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|r| (o.id, r.clone())))
            .collect()
    }

    /// Files that failed
    #[must_use]
    pub fn failed(&self) -> Vec<FailedUpload> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.result.as_ref().err().map(|e| FailedUpload {
                    id: o.id,
                    name: o.name.clone(),
                    reason: e.message.clone(),
                })
            })
            .collect()
    }
}

/// Batch uploader
#[derive(Clone)]
pub struct UploadPipeline {
    uploader: Arc<dyn MediaUploader>,
    concurrency: usize,
}

impl UploadPipeline {
    /// Create pipeline uploading one file at a time
    #[must_use]
    pub fn new(uploader: Arc<dyn MediaUploader>) -> Self {
        Self {
            uploader,
            concurrency: 1,
        }
    }

    /// Allow up to `n` uploads in flight (order of results is unchanged)
    #[must_use]
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Upload every job, abort-all
    ///
    /// Returns references in job order only if every upload succeeds. On
    /// any failure the stored files are deleted and no partial result is
    /// returned.
    ///
    /// # Errors
    /// `UploadError::Batch` naming every file that failed
    pub async fn upload_all(&self, jobs: &[UploadJob], owner: &OwnerId) -> Result<UploadResult, UploadError> {
        let report = self.upload_each(jobs, owner, &CancellationToken::new()).await;
        self.settle(report, UploadPolicy::AbortAll, owner).await
    }

    /// Upload every job and report each outcome
    ///
    /// Stops issuing uploads once `cancel` fires. Uploads already in flight
    /// run to completion and are reported, so a voided batch can delete
    /// what they stored; the report is then marked cancelled.
    pub async fn upload_each(
        &self,
        jobs: &[UploadJob],
        owner: &OwnerId,
        cancel: &CancellationToken,
    ) -> UploadReport {
        tracing::info!(%owner, files = jobs.len(), concurrency = self.concurrency, "uploading staged media");

        let mut queue = jobs.iter();
        let mut in_flight = FuturesOrdered::new();
        let mut outcomes = Vec::with_capacity(jobs.len());
        loop {
            while in_flight.len() < self.concurrency && !cancel.is_cancelled() {
                let Some(job) = queue.next() else { break };
                in_flight.push_back(self.upload_one(job, owner));
            }
            match in_flight.next().await {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }

        let cancelled = outcomes.len() < jobs.len() && cancel.is_cancelled();
        if cancelled {
            tracing::info!(completed = outcomes.len(), requested = jobs.len(), "upload cancelled");
        }

        UploadReport {
            outcomes,
            requested: jobs.len(),
            cancelled,
        }
    }

    async fn upload_one(&self, job: &UploadJob, owner: &OwnerId) -> UploadOutcome {
        let result = self.uploader.upload(owner, job).await;
        match &result {
            Ok(reference) => tracing::debug!(id = %job.id, %reference, "upload ok"),
            Err(e) => tracing::warn!(id = %job.id, name = %job.source.name, error = %e, "upload failed"),
        }
        UploadOutcome {
            id: job.id,
            name: job.source.name.clone(),
            result,
        }
    }

    /// Apply a batch policy to a report
    ///
    /// # Errors
    /// - `UploadError::Batch` / `UploadError::Partial` for failed files
    /// - `UploadError::Cancelled` if the batch did not finish
    pub async fn settle(
        &self,
        report: UploadReport,
        policy: UploadPolicy,
        owner: &OwnerId,
    ) -> Result<UploadResult, UploadError> {
        if report.all_succeeded() {
            let refs = report
                .outcomes
                .into_iter()
                .filter_map(|o| o.result.ok())
                .collect();
            return Ok(UploadResult(refs));
        }

        let stored = report.succeeded();
        let failed = report.failed();
        let completed = report.outcomes.len();

        match policy {
            UploadPolicy::AbortAll => {
                let (compensated, orphaned) = self.compensate(&stored, owner).await;
                if report.cancelled {
                    Err(UploadError::Cancelled {
                        completed,
                        kept: Vec::new(),
                    })
                } else {
                    Err(UploadError::Batch {
                        failed,
                        compensated,
                        orphaned,
                    })
                }
            }
            UploadPolicy::KeepPartial => {
                if report.cancelled {
                    Err(UploadError::Cancelled {
                        completed,
                        kept: stored,
                    })
                } else {
                    Err(UploadError::Partial {
                        failed,
                        kept: stored,
                    })
                }
            }
        }
    }

    /// Delete references stored by a voided batch
    ///
    /// Also used when a later step (record creation) fails after a
    /// successful batch. Returns the number deleted and the references that
    /// could not be.
    pub async fn compensate(
        &self,
        stored: &[(LocalId, MediaReference)],
        owner: &OwnerId,
    ) -> (usize, Vec<MediaReference>) {
        let mut deleted = 0;
        let mut orphaned = Vec::new();

        for (id, reference) in stored {
            match self.uploader.delete(owner, reference).await {
                Ok(()) => {
                    tracing::debug!(%id, %reference, "deleted orphaned upload");
                    deleted += 1;
                }
                Err(e) => {
                    tracing::error!(%id, %reference, error = %e, "orphaned upload could not be deleted");
                    orphaned.push(reference.clone());
                }
            }
        }

        (deleted, orphaned)
    }
}

impl std::fmt::Debug for UploadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadPipeline")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceFile;
    use mockall::predicate::always;

    fn jobs(names: &[&str]) -> Vec<UploadJob> {
        names
            .iter()
            .map(|n| UploadJob {
                id: LocalId::new(),
                source: SourceFile::new(format!("/photos/{n}"), "image/jpeg", 1),
            })
            .collect()
    }

    fn owner() -> OwnerId {
        OwnerId::new("u42")
    }

    #[tokio::test]
    async fn all_succeed_in_order() {
        let mut mock = MockMediaUploader::new();
        mock.expect_upload()
            .times(3)
            .returning(|owner, job| Ok(MediaReference::new(format!("{owner}/{}", job.source.name))));
        mock.expect_delete().never();

        let pipeline = UploadPipeline::new(Arc::new(mock));
        let result = pipeline
            .upload_all(&jobs(&["f1", "f2", "f3"]), &owner())
            .await
            .unwrap();

        let refs: Vec<_> = result.references().iter().map(MediaReference::as_str).collect();
        assert_eq!(refs, vec!["u42/f1", "u42/f2", "u42/f3"]);
        assert_eq!(result.primary().map(MediaReference::as_str), Some("u42/f1"));
    }

    #[tokio::test]
    async fn middle_failure_aborts_and_compensates() {
        let mut mock = MockMediaUploader::new();
        mock.expect_upload().times(3).returning(|_, job| {
            if job.source.name == "f2" {
                Err(UploadFailure::new("quota exceeded"))
            } else {
                Ok(MediaReference::new(job.source.name.clone()))
            }
        });
        mock.expect_delete()
            .with(always(), always())
            .times(2)
            .returning(|_, _| Ok(()));

        let pipeline = UploadPipeline::new(Arc::new(mock));
        let err = pipeline
            .upload_all(&jobs(&["f1", "f2", "f3"]), &owner())
            .await
            .unwrap_err();

        match err {
            UploadError::Batch {
                failed,
                compensated,
                orphaned,
            } => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].name, "f2");
                assert_eq!(failed[0].reason, "quota exceeded");
                assert_eq!(compensated, 2);
                assert!(orphaned.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_compensation_reports_orphans() {
        let mut mock = MockMediaUploader::new();
        mock.expect_upload().returning(|_, job| {
            if job.source.name == "bad" {
                Err(UploadFailure::new("boom"))
            } else {
                Ok(MediaReference::new(job.source.name.clone()))
            }
        });
        mock.expect_delete()
            .returning(|_, _| Err(UploadFailure::new("storage offline")));

        let pipeline = UploadPipeline::new(Arc::new(mock));
        let err = pipeline
            .upload_all(&jobs(&["ok", "bad"]), &owner())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Batch { compensated: 0, ref orphaned, .. } if orphaned.len() == 1
        ));
    }

    #[tokio::test]
    async fn keep_partial_returns_stored_references() {
        let mut mock = MockMediaUploader::new();
        mock.expect_upload().returning(|_, job| {
            if job.source.name == "f3" {
                Err(UploadFailure::new("timeout"))
            } else {
                Ok(MediaReference::new(job.source.name.clone()))
            }
        });
        mock.expect_delete().never();

        let pipeline = UploadPipeline::new(Arc::new(mock));
        let batch = jobs(&["f1", "f2", "f3"]);
        let report = pipeline
            .upload_each(&batch, &owner(), &CancellationToken::new())
            .await;
        let err = pipeline
            .settle(report, UploadPolicy::KeepPartial, &owner())
            .await
            .unwrap_err();

        let kept: Vec<_> = err.kept().iter().map(|(id, _)| *id).collect();
        assert_eq!(kept, vec![batch[0].id, batch[1].id]);
        assert_eq!(err.failed().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_batch_uploads_nothing_more() {
        let mut mock = MockMediaUploader::new();
        mock.expect_upload().never();
        mock.expect_delete().never();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let pipeline = UploadPipeline::new(Arc::new(mock));
        let report = pipeline
            .upload_each(&jobs(&["a", "b"]), &owner(), &cancel)
            .await;
        assert!(report.cancelled);
        assert!(report.outcomes.is_empty());

        let err = pipeline
            .settle(report, UploadPolicy::AbortAll, &owner())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn empty_batch_is_trivially_complete() {
        let mock = MockMediaUploader::new();
        let pipeline = UploadPipeline::new(Arc::new(mock));
        let result = pipeline.upload_all(&[], &owner()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn concurrency_keeps_job_order() {
        let mut mock = MockMediaUploader::new();
        mock.expect_upload()
            .returning(|_, job| Ok(MediaReference::new(job.id.to_string())));

        let batch = jobs(&["a", "b", "c", "d", "e"]);
        let pipeline = UploadPipeline::new(Arc::new(mock)).with_concurrency(3);
        let result = pipeline.upload_all(&batch, &owner()).await.unwrap();

        let expected: Vec<_> = batch.iter().map(|j| j.id.to_string()).collect();
        let got: Vec<_> = result.references().iter().map(|r| r.as_str().to_string()).collect();
        assert_eq!(got, expected);
    }
}
