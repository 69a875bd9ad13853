//! Composer notifications
//!
//! Broadcast to any number of listeners (a dashboard list, an audit log).
//! Publishing never blocks and never fails when nobody listens.

use crate::record::RecordId;
use lc_media::OwnerId;
use serde::Serialize;
use tokio::sync::broadcast;

/// Buffered events per slow listener before it starts lagging
pub const EVENT_CAPACITY: usize = 64;

/// Signals emitted by the composer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ComposerEvent {
    /// A record was created from a submitted listing
    RecordCreated {
        /// New record
        record_id: RecordId,
        /// Owner it was created for
        owner_id: OwnerId,
    },
}

/// Broadcast channel for [`ComposerEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ComposerEvent>,
}

impl EventBus {
    /// Create bus with [`EVENT_CAPACITY`]
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// New listener receiving events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ComposerEvent> {
        self.tx.subscribe()
    }

    /// Publish to every current listener
    pub fn publish(&self, event: ComposerEvent) {
        match self.tx.send(event) {
            Ok(n) => tracing::debug!(listeners = n, "event published"),
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(?event, "event dropped: no listeners");
            }
        }
    }

    /// Number of live listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
