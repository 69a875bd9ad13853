//! Periodic draft autosave
//!
//! An explicit scheduled task owned by the wizard session. It is started
//! with [`Autosave::spawn`] and stopped through the returned
//! [`AutosaveHandle`] (or by dropping it).
//!
//! Writes are fenced by a [`SessionGate`]: a tick holds the gate's read
//! side from snapshot to write, and closing the gate waits for that tick
//! to finish. Once `close` returns no tick can write, so clearing the draft
//! right after closing cannot be undone by a late autosave.

use crate::draft::{DraftSnapshot, DraftStore};
use crate::error::PersistenceError;
use async_trait::async_trait;
use lc_media::OwnerId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Source of the latest session state
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Current state, or `None` when there is nothing worth saving
    async fn snapshot(&self) -> Option<DraftSnapshot>;
}

/// "Session still active" flag shared by the session and its autosave
#[derive(Debug, Clone)]
pub struct SessionGate {
    open: Arc<RwLock<bool>>,
}

/// Proof that the gate was open; writes happen while this is held
#[derive(Debug)]
pub struct GatePass<'a> {
    _guard: RwLockReadGuard<'a, bool>,
}

/// Exclusive hold on the gate; no pass is granted while it lives
#[derive(Debug)]
pub struct GateHold<'a> {
    _guard: RwLockWriteGuard<'a, bool>,
}

impl SessionGate {
    /// Create an open gate
    #[must_use]
    pub fn open() -> Self {
        Self {
            open: Arc::new(RwLock::new(true)),
        }
    }

    /// Enter the gate if it is open
    pub async fn enter(&self) -> Option<GatePass<'_>> {
        let guard = self.open.read().await;
        if *guard {
            Some(GatePass { _guard: guard })
        } else {
            None
        }
    }

    /// Whether the gate is open
    pub async fn is_open(&self) -> bool {
        *self.open.read().await
    }

    /// Close the gate, waiting for every in-flight pass to drop
    pub async fn close(&self) {
        *self.open.write().await = false;
    }

    /// Keep autosave out without changing whether the gate is open
    ///
    /// Waits for an in-flight pass like `close`. A `close` issued while the
    /// hold lives takes effect once it drops.
    pub async fn hold(&self) -> GateHold<'_> {
        GateHold {
            _guard: self.open.write().await,
        }
    }

    /// Reopen the gate for a new session
    pub async fn reopen(&self) {
        *self.open.write().await = true;
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::open()
    }
}

/// Counters for one autosave task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutosaveStats {
    /// Interval ticks observed
    pub ticks: u64,
    /// Drafts written
    pub saves: u64,
    /// Ticks with a closed gate or nothing to save
    pub skipped: u64,
    /// Failed writes
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    saves: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> AutosaveStats {
        AutosaveStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            saves: self.saves.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Callback for failed autosave writes
pub type FailureHook = Arc<dyn Fn(&PersistenceError) + Send + Sync>;

/// Autosave task builder
pub struct Autosave {
    store: Arc<DraftStore>,
    owner: OwnerId,
    provider: Arc<dyn SnapshotProvider>,
    interval: Duration,
    gate: SessionGate,
    on_failure: Option<FailureHook>,
}

impl Autosave {
    /// Default interval between saves
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

    /// Create builder
    #[must_use]
    pub fn new(store: Arc<DraftStore>, owner: OwnerId, provider: Arc<dyn SnapshotProvider>) -> Self {
        Self {
            store,
            owner,
            provider,
            interval: Self::DEFAULT_INTERVAL,
            gate: SessionGate::open(),
            on_failure: None,
        }
    }

    /// With interval (zero is raised to one millisecond)
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// With session gate
    #[must_use]
    pub fn gate(mut self, gate: SessionGate) -> Self {
        self.gate = gate;
        self
    }

    /// Called after each failed write
    #[must_use]
    pub fn on_failure(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    /// Start the recurring task
    ///
    /// The first save happens one interval after spawning.
    #[must_use]
    pub fn spawn(self) -> AutosaveHandle {
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        tracing::info!(owner = %self.owner, interval = ?self.interval, "autosave started");
        let task = tokio::spawn(run(self, cancel.clone(), Arc::clone(&counters)));

        AutosaveHandle {
            cancel,
            task: Some(task),
            counters,
        }
    }
}

impl std::fmt::Debug for Autosave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autosave")
            .field("owner", &self.owner)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

async fn run(job: Autosave, cancel: CancellationToken, counters: Arc<Counters>) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + job.interval, job.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        counters.ticks.fetch_add(1, Ordering::Relaxed);

        let Some(_pass) = job.gate.enter().await else {
            tracing::trace!(owner = %job.owner, "autosave skipped: session closed");
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        let Some(snapshot) = job.provider.snapshot().await else {
            tracing::trace!(owner = %job.owner, "autosave skipped: nothing to save");
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        match job.store.save(&job.owner, snapshot).await {
            Ok(summary) => {
                counters.saves.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(owner = %job.owner, saved_at = %summary.saved_at, "autosaved draft");
            }
            Err(e) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(owner = %job.owner, error = %e, "autosave failed");
                if let Some(hook) = &job.on_failure {
                    hook(&e);
                }
            }
        }
    }

    tracing::info!(owner = %job.owner, "autosave stopped");
}

/// Cancellation handle for a running autosave task
///
/// Dropping the handle cancels the task without waiting for it.
#[derive(Debug)]
pub struct AutosaveHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl AutosaveHandle {
    /// Stop the task and wait until it has exited
    pub async fn cancel(mut self) -> AutosaveStats {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "autosave task ended abnormally");
            }
        }
        self.counters.snapshot()
    }

    /// Counters so far
    #[must_use]
    pub fn stats(&self) -> AutosaveStats {
        self.counters.snapshot()
    }

    /// Whether the task is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for AutosaveHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
