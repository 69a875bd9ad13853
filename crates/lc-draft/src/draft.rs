//! Draft store
//!
//! At most one draft per owner, stored as JSON under
//! `<prefix>:<owner>`. Every save stamps the draft with a timestamp that is
//! strictly greater than the previous one for that owner.

use crate::error::PersistenceError;
use crate::store::KeyValueStore;
use chrono::{DateTime, Duration, Utc};
use lc_media::{OwnerId, StagedMediaRef};
use lc_wizard::{FieldKey, FieldValue, StepId, WizardSnapshot};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Current on-disk draft format
pub const DRAFT_FORMAT_VERSION: u32 = 1;

/// Default key prefix
pub const DEFAULT_KEY_PREFIX: &str = "listing-draft";

/// State handed to the store for saving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    /// Wizard step and fields
    pub wizard: WizardSnapshot,
    /// Staged media in staging order
    pub staged_media: Vec<StagedMediaRef>,
}

/// Persisted draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    /// Format version
    pub version: u32,
    /// Owner the draft belongs to
    pub owner_id: OwnerId,
    /// Step the user was on
    pub current_step: StepId,
    /// Field values
    pub fields: BTreeMap<FieldKey, FieldValue>,
    /// Staged media references
    #[serde(default)]
    pub staged_media: Vec<StagedMediaRef>,
    /// Save time, strictly increasing per owner
    pub saved_at: DateTime<Utc>,
}

impl Draft {
    /// State to restore into a session
    #[must_use]
    pub fn into_snapshot(self) -> DraftSnapshot {
        DraftSnapshot {
            wizard: WizardSnapshot {
                current_step: self.current_step,
                fields: self.fields,
            },
            staged_media: self.staged_media,
        }
    }

    /// Display summary
    #[must_use]
    pub fn summary(&self) -> DraftSummary {
        DraftSummary {
            saved_at: self.saved_at,
            current_step: self.current_step,
            field_count: self.fields.len(),
            media_count: self.staged_media.len(),
        }
    }
}

/// What a "resume draft?" prompt shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftSummary {
    /// Last save time
    pub saved_at: DateTime<Utc>,
    /// Step the draft is on
    pub current_step: StepId,
    /// Number of stored fields
    pub field_count: usize,
    /// Number of staged media references
    pub media_count: usize,
}

/// Owner-scoped draft persistence over a [`KeyValueStore`]
pub struct DraftStore {
    backend: Arc<dyn KeyValueStore>,
    prefix: String,
    clock: fn() -> DateTime<Utc>,
    last_saved: Mutex<HashMap<OwnerId, DateTime<Utc>>>,
}

impl DraftStore {
    /// Create store with the default key prefix
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            clock: Utc::now,
            last_saved: Mutex::new(HashMap::new()),
        }
    }

    /// With key prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// With clock (tests use a frozen clock)
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Storage key for an owner
    #[must_use]
    pub fn key_for(&self, owner: &OwnerId) -> String {
        format!("{}:{}", self.prefix, owner)
    }

    /// Write `snapshot` as the owner's draft, replacing any previous one
    ///
    /// # Errors
    /// `PersistenceError` from encoding or the backend
    pub async fn save(&self, owner: &OwnerId, snapshot: DraftSnapshot) -> Result<DraftSummary, PersistenceError> {
        let seed = match self.cached_timestamp(owner) {
            Some(_) => None,
            None => self.stored_timestamp(owner).await,
        };
        let saved_at = self.stamp(owner, seed);

        let draft = Draft {
            version: DRAFT_FORMAT_VERSION,
            owner_id: owner.clone(),
            current_step: snapshot.wizard.current_step,
            fields: snapshot.wizard.fields,
            staged_media: snapshot.staged_media,
            saved_at,
        };
        let json = serde_json::to_string(&draft)?;
        let key = self.key_for(owner);

        self.backend.set(&key, json).await.map_err(|e| {
            tracing::warn!(%owner, error = %e, "draft save failed");
            e
        })?;

        tracing::debug!(%owner, step = %draft.current_step, fields = draft.fields.len(), "draft saved");
        Ok(draft.summary())
    }

    /// The owner's draft, if one exists
    ///
    /// # Errors
    /// - `PersistenceError::Corrupt` if the stored value is not a draft for this owner
    /// - `PersistenceError::UnsupportedVersion` for unknown formats
    /// - backend errors
    pub async fn load(&self, owner: &OwnerId) -> Result<Option<Draft>, PersistenceError> {
        let key = self.key_for(owner);
        let Some(raw) = self.backend.get(&key).await? else {
            return Ok(None);
        };

        let draft = decode(&key, &raw)?;
        if draft.owner_id != *owner {
            return Err(PersistenceError::Corrupt {
                key,
                reason: format!("draft belongs to {}", draft.owner_id),
            });
        }

        tracing::debug!(%owner, step = %draft.current_step, "draft loaded");
        Ok(Some(draft))
    }

    /// Whether the owner has a draft
    ///
    /// # Errors
    /// Backend errors only; a corrupt draft still exists
    pub async fn exists(&self, owner: &OwnerId) -> Result<bool, PersistenceError> {
        Ok(self.backend.get(&self.key_for(owner)).await?.is_some())
    }

    /// Summary of the owner's draft for display
    ///
    /// # Errors
    /// Same as [`DraftStore::load`]
    pub async fn summary(&self, owner: &OwnerId) -> Result<Option<DraftSummary>, PersistenceError> {
        Ok(self.load(owner).await?.as_ref().map(Draft::summary))
    }

    /// Remove the owner's draft
    ///
    /// # Errors
    /// Backend errors
    pub async fn clear(&self, owner: &OwnerId) -> Result<(), PersistenceError> {
        self.backend.remove(&self.key_for(owner)).await?;
        tracing::debug!(%owner, "draft cleared");
        Ok(())
    }

    /// Next timestamp for `owner`, reserved before the write so overlapping
    /// saves never share one
    fn stamp(&self, owner: &OwnerId, seed: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let mut last_saved = self.last_saved.lock();
        let previous = last_saved.get(owner).copied().max(seed);
        let now = (self.clock)();
        let saved_at = match previous {
            Some(prev) if now <= prev => prev + Duration::milliseconds(1),
            _ => now,
        };
        last_saved.insert(owner.clone(), saved_at);
        saved_at
    }

    fn cached_timestamp(&self, owner: &OwnerId) -> Option<DateTime<Utc>> {
        self.last_saved.lock().get(owner).copied()
    }

    async fn stored_timestamp(&self, owner: &OwnerId) -> Option<DateTime<Utc>> {
        self.load(owner).await.ok().flatten().map(|d| d.saved_at)
    }
}

impl std::fmt::Debug for DraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

fn decode(key: &str, raw: &str) -> Result<Draft, PersistenceError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| PersistenceError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

    let version = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| PersistenceError::Corrupt {
            key: key.to_string(),
            reason: "missing version".to_string(),
        })?;
    if version != DRAFT_FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: version,
            expected: DRAFT_FORMAT_VERSION,
        });
    }

    serde_json::from_value(value).map_err(|e| PersistenceError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
