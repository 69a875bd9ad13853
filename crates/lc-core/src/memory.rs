//! In-memory collaborators
//!
//! Stand-ins for the remote media store, the record backend and the
//! confirmation prompt. Each one can be told to fail so error paths can be
//! exercised without a network.

use crate::collaborators::{Confirm, CreateFailure, RecordCreator};
use crate::record::{RecordId, SubmissionRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use lc_media::{MediaReference, MediaUploader, OwnerId, UploadFailure, UploadJob};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use ulid::Ulid;
use uuid::Uuid;

/// Media store keeping references in a map
#[derive(Debug, Default)]
pub struct MemoryUploader {
    stored: DashMap<MediaReference, OwnerId>,
    failing: Mutex<HashSet<String>>,
    fail_deletes: AtomicBool,
    latency: Mutex<Option<Duration>>,
    uploads: AtomicUsize,
}

impl MemoryUploader {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every upload of a file with this name
    pub fn fail_on(&self, name: impl Into<String>) {
        self.failing.lock().insert(name.into());
    }

    /// Stop failing uploads of this name
    pub fn recover(&self, name: &str) {
        self.failing.lock().remove(name);
    }

    /// Make compensating deletes fail
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::Relaxed);
    }

    /// Delay every upload
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// References currently stored
    #[must_use]
    pub fn stored(&self) -> Vec<MediaReference> {
        self.stored.iter().map(|e| e.key().clone()).collect()
    }

    /// Whether `reference` is stored
    #[must_use]
    pub fn contains(&self, reference: &MediaReference) -> bool {
        self.stored.contains_key(reference)
    }

    /// Upload attempts so far, failed ones included
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MediaUploader for MemoryUploader {
    async fn upload(&self, owner: &OwnerId, job: &UploadJob) -> Result<MediaReference, UploadFailure> {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.lock().contains(&job.source.name) {
            return Err(UploadFailure::new(format!("storage rejected {}", job.source.name)));
        }

        let reference = MediaReference::new(format!("mem://{owner}/{}-{}", Ulid::new(), job.source.name));
        self.stored.insert(reference.clone(), owner.clone());
        Ok(reference)
    }

    async fn delete(&self, owner: &OwnerId, reference: &MediaReference) -> Result<(), UploadFailure> {
        if self.fail_deletes.load(Ordering::Relaxed) {
            return Err(UploadFailure::new("delete refused"));
        }
        match self.stored.remove_if(reference, |_, stored_for| stored_for == owner) {
            Some(_) => Ok(()),
            None => Err(UploadFailure::new(format!("{reference} not found for {owner}"))),
        }
    }
}

/// Record backend keeping records in a map
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: DashMap<RecordId, (OwnerId, SubmissionRecord)>,
    fail_with: Mutex<Option<String>>,
}

impl MemoryRecordStore {
    /// Create empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every create with `message` until cleared with `None`
    pub fn fail_with(&self, message: Option<String>) {
        *self.fail_with.lock() = message;
    }

    /// Stored record
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<SubmissionRecord> {
        self.records.get(id).map(|e| e.value().1.clone())
    }

    /// Ids of records created for `owner`
    #[must_use]
    pub fn records_for(&self, owner: &OwnerId) -> Vec<RecordId> {
        self.records
            .iter()
            .filter(|e| e.value().0 == *owner)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordCreator for MemoryRecordStore {
    async fn create(&self, owner: &OwnerId, record: &SubmissionRecord) -> Result<RecordId, CreateFailure> {
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(CreateFailure::new(message));
        }
        let id = RecordId::new(Uuid::new_v4().to_string());
        self.records.insert(id.clone(), (owner.clone(), record.clone()));
        Ok(id)
    }
}

/// Prompt that always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, message: &str) -> bool {
        tracing::debug!(message, answer = self.0, "auto-confirm");
        self.0
    }
}
