//! Status banner
//!
//! Holds the one notice currently shown to the user. Success notices clear
//! themselves after a delay; errors stay until replaced or dismissed;
//! warnings (autosave trouble) never hide an error.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A user-visible notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Transient confirmation
    Success(String),
    /// Persistent failure message
    Error(String),
    /// Non-blocking warning
    Warning(String),
}

impl Notice {
    /// Message text
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Success(m) | Self::Error(m) | Self::Warning(m) => m,
        }
    }
}

#[derive(Debug, Default)]
struct BannerState {
    notice: Option<Notice>,
    // Bumped on every change so a stale auto-clear does nothing
    generation: u64,
}

/// Shared handle to the current notice
#[derive(Debug, Clone)]
pub struct StatusBanner {
    state: Arc<Mutex<BannerState>>,
    success_ttl: Duration,
}

impl StatusBanner {
    /// Create empty banner
    #[must_use]
    pub fn new(success_ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BannerState::default())),
            success_ttl,
        }
    }

    /// Notice currently shown
    #[must_use]
    pub fn current(&self) -> Option<Notice> {
        self.state.lock().notice.clone()
    }

    /// Show a success notice that clears itself
    ///
    /// Must be called from within a tokio runtime.
    pub fn success(&self, message: impl Into<String>) {
        let generation = self.set(Notice::Success(message.into()));
        let state = Arc::clone(&self.state);
        let ttl = self.success_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut state = state.lock();
            if state.generation == generation {
                state.notice = None;
                state.generation += 1;
            }
        });
    }

    /// Show an error until replaced or dismissed
    pub fn error(&self, message: impl Into<String>) {
        self.set(Notice::Error(message.into()));
    }

    /// Show a warning unless an error is up
    pub fn warning(&self, message: impl Into<String>) {
        let mut state = self.state.lock();
        if matches!(state.notice, Some(Notice::Error(_))) {
            return;
        }
        state.notice = Some(Notice::Warning(message.into()));
        state.generation += 1;
    }

    /// Remove whatever is shown
    pub fn dismiss(&self) {
        let mut state = self.state.lock();
        state.notice = None;
        state.generation += 1;
    }

    fn set(&self, notice: Notice) -> u64 {
        let mut state = self.state.lock();
        state.notice = Some(notice);
        state.generation += 1;
        state.generation
    }
}
