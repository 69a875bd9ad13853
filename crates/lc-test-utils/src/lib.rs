//! Testing utilities for the listing composer workspace
//!
//! Shared fixtures and scripted collaborators.

#![allow(missing_docs)]

use async_trait::async_trait;
use lc_core::{Collaborators, ComposerConfig, ComposerError, ComposerSession, Confirm, MemoryRecordStore, MemoryUploader};
use lc_draft::{KeyValueStore, MemoryStore, PersistenceError};
use lc_media::{OwnerId, SourceFile};
use lc_wizard::{FieldValue, StepId, StepWizard, WizardSchema};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Every required field of the listing schema, step by step
pub const LISTING_FIELDS: [(&str, &str); 6] = [
    ("title", "Corner office"),
    ("category", "office"),
    ("listing_type", "rent"),
    ("address", "1 Main St"),
    ("city", "Springfield"),
    ("price", "2400"),
];

/// Wizard on the review step with every required field set
pub fn filled_listing_wizard() -> StepWizard {
    let mut wizard = StepWizard::new(Arc::new(WizardSchema::listing()));
    for (key, value) in LISTING_FIELDS {
        wizard.set_field(key, value).unwrap();
    }
    wizard.jump_to(StepId(5)).unwrap();
    wizard
}

/// Fill a started session and walk it to the review step through `go_next`
pub async fn fill_session(session: &ComposerSession) -> Result<(), ComposerError> {
    for (key, value) in LISTING_FIELDS {
        session.set_field(key, FieldValue::text(value)).await?;
    }
    while session.current_step().await < StepId(5) {
        session.go_next().await?;
    }
    Ok(())
}

/// JPEG files named after `names`
pub fn sample_files(names: &[&str]) -> Vec<SourceFile> {
    names
        .iter()
        .map(|n| SourceFile::new(format!("/photos/{n}"), "image/jpeg", 32_000))
        .collect()
}

/// Confirm prompt answering from a script and recording every question
///
/// Answers `default` once the script runs out.
#[derive(Debug)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
    default: bool,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = bool>, default: bool) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
            default,
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl Confirm for ScriptedConfirm {
    async fn confirm(&self, message: &str) -> bool {
        self.asked.lock().push(message.to_string());
        self.answers.lock().pop_front().unwrap_or(self.default)
    }
}

/// Key-value store whose writes can be switched off
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Successful writes so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(PersistenceError::Unavailable("storage quota exceeded".into()));
        }
        self.inner.set(key, value).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.inner.remove(key).await
    }
}

/// In-memory backends behind a test session
#[derive(Clone)]
pub struct TestBackends {
    pub uploader: Arc<MemoryUploader>,
    pub records: Arc<MemoryRecordStore>,
    pub store: Arc<FlakyStore>,
    pub confirm: Arc<ScriptedConfirm>,
}

impl TestBackends {
    /// Fresh backends; the prompt says yes to everything
    pub fn new() -> Self {
        Self {
            uploader: Arc::new(MemoryUploader::new()),
            records: Arc::new(MemoryRecordStore::new()),
            store: Arc::new(FlakyStore::new()),
            confirm: Arc::new(ScriptedConfirm::new(Vec::new(), true)),
        }
    }

    pub fn with_confirm(mut self, confirm: ScriptedConfirm) -> Self {
        self.confirm = Arc::new(confirm);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(self.uploader.clone(), self.records.clone(), self.store.clone())
            .with_confirm(self.confirm.clone())
    }

    /// Unstarted session for `owner` over these backends
    pub fn session(&self, owner: &str, config: ComposerConfig) -> ComposerSession {
        ComposerSession::new(OwnerId::new(owner), config, self.collaborators())
    }
}

impl Default for TestBackends {
    fn default() -> Self {
        Self::new()
    }
}
