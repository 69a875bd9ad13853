//! Staging area and upload pipeline working together

use async_trait::async_trait;
use lc_media::{
    CancellationToken, LocalPreviews, MediaReference, MediaStagingArea, MediaUploader, OwnerId,
    SourceFile, UploadError, UploadFailure, UploadJob, UploadPipeline, UploadPolicy,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Uploader storing references in memory, failing for chosen file names
#[derive(Default)]
struct FlakyStore {
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    stored: Mutex<Vec<MediaReference>>,
    uploads: Mutex<Vec<String>>,
}

impl FlakyStore {
    fn fail(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    fn slow(&self, name: &str, delay: Duration) {
        self.delays.lock().insert(name.to_string(), delay);
    }

    fn heal(&self) {
        self.failing.lock().clear();
    }
}

#[async_trait]
impl MediaUploader for FlakyStore {
    async fn upload(&self, owner: &OwnerId, job: &UploadJob) -> Result<MediaReference, UploadFailure> {
        self.uploads.lock().push(job.source.name.clone());
        let delay = self.delays.lock().get(&job.source.name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&job.source.name) {
            return Err(UploadFailure::new(format!("{} rejected", job.source.name)));
        }
        let reference = MediaReference::new(format!("store://{owner}/{}", job.source.name));
        self.stored.lock().push(reference.clone());
        Ok(reference)
    }

    async fn delete(&self, _owner: &OwnerId, reference: &MediaReference) -> Result<(), UploadFailure> {
        self.stored.lock().retain(|r| r != reference);
        Ok(())
    }
}

fn staged(names: &[&str]) -> (Arc<LocalPreviews>, MediaStagingArea) {
    let previews = Arc::new(LocalPreviews::new());
    let mut area = MediaStagingArea::new(previews.clone());
    for name in names {
        area.stage(SourceFile::new(format!("/pics/{name}"), "image/jpeg", 10))
            .unwrap();
    }
    (previews, area)
}

#[tokio::test]
async fn abort_all_leaves_no_remote_files() {
    let store = Arc::new(FlakyStore::default());
    store.fail("f2.jpg");
    let (_, area) = staged(&["f1.jpg", "f2.jpg", "f3.jpg"]);

    let pipeline = UploadPipeline::new(store.clone());
    let err = pipeline
        .upload_all(&area.pending_jobs(), &OwnerId::new("u42"))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Batch { compensated: 2, .. }));
    assert!(store.stored.lock().is_empty());
    assert_eq!(area.len(), 3);
}

#[tokio::test]
async fn keep_partial_retry_uploads_only_failed_file() {
    let store = Arc::new(FlakyStore::default());
    store.fail("f2.jpg");
    let (_, mut area) = staged(&["f1.jpg", "f2.jpg", "f3.jpg"]);
    let owner = OwnerId::new("u42");
    let pipeline = UploadPipeline::new(store.clone());

    let report = pipeline
        .upload_each(&area.pending_jobs(), &owner, &CancellationToken::new())
        .await;
    let err = pipeline
        .settle(report, UploadPolicy::KeepPartial, &owner)
        .await
        .unwrap_err();
    for (id, reference) in err.kept() {
        assert!(area.mark_uploaded(*id, reference.clone()));
    }

    store.heal();
    store.uploads.lock().clear();
    let pending = area.pending_jobs();
    assert_eq!(pending.len(), 1);
    pipeline.upload_all(&pending, &owner).await.unwrap();

    assert_eq!(*store.uploads.lock(), vec!["f2.jpg".to_string()]);
    assert_eq!(store.stored.lock().len(), 3);
}

#[tokio::test]
async fn dropping_area_after_upload_releases_previews() {
    let store = Arc::new(FlakyStore::default());
    let (previews, area) = staged(&["a.jpg", "b.jpg"]);

    let result = UploadPipeline::new(store)
        .upload_all(&area.pending_jobs(), &OwnerId::new("u7"))
        .await
        .unwrap();
    assert_eq!(result.len(), 2);

    drop(area);
    assert_eq!(previews.stats().live, 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_waits_for_in_flight_uploads_and_removes_them() {
    let store = Arc::new(FlakyStore::default());
    store.slow("a.jpg", Duration::from_millis(100));
    store.slow("b.jpg", Duration::from_millis(10));
    let (_previews, area) = staged(&["a.jpg", "b.jpg", "c.jpg"]);
    let pipeline = UploadPipeline::new(store.clone()).with_concurrency(2);
    let owner = OwnerId::new("u42");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = pipeline.upload_each(&area.pending_jobs(), &owner, &cancel).await;
    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 2);
    let mut issued = store.uploads.lock().clone();
    issued.sort();
    assert_eq!(issued, vec!["a.jpg".to_string(), "b.jpg".to_string()]);

    let err = pipeline
        .settle(report, UploadPolicy::AbortAll, &owner)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(store.stored.lock().is_empty());
}
