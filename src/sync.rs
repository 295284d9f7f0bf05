// 🔄 Sync coordinator - single-flight refresh over fetch + reconcile
// At most one refresh runs at a time; contenders are told so immediately.

use crate::feed::{FeedError, SourceFeed};
use crate::reconcile::{ReconcileSummary, ReconciliationEngine};
use crate::store::WatchlistStore;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

/// Process-wide refresh status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    Idle,
    Busy,
}

// ============================================================================
// REFRESH ERRORS
// ============================================================================

/// Why a refresh run failed. All of these are recoverable: the guard is
/// released and the next trigger may proceed.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("watchlist source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("malformed watchlist payload: {0}")]
    MalformedPayload(String),

    #[error("record store failure: {0}")]
    StoreFailure(String),
}

impl From<FeedError> for RefreshError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Unavailable(msg) => RefreshError::SourceUnavailable(msg),
            FeedError::Malformed(msg) => RefreshError::MalformedPayload(msg),
        }
    }
}

/// Outcome of a refresh trigger. Failures are part of the outcome, not a
/// panic or an `Err` at this boundary.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Another refresh holds the guard; nothing happened.
    AlreadyInProgress,

    Completed(ReconcileSummary),

    Failed(RefreshError),
}

// ============================================================================
// SYNC COORDINATOR
// ============================================================================

pub struct SyncCoordinator {
    feed: Box<dyn SourceFeed>,
    store: Arc<Mutex<WatchlistStore>>,
    engine: ReconciliationEngine,
    busy: AtomicBool,
}

/// Releases the single-flight guard when dropped, so every exit path out of
/// a refresh (including an unwind) returns the state to idle.
struct GuardToken<'a> {
    flag: &'a AtomicBool,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl SyncCoordinator {
    pub fn new(feed: Box<dyn SourceFeed>, store: Arc<Mutex<WatchlistStore>>) -> Self {
        SyncCoordinator {
            feed,
            store,
            engine: ReconciliationEngine::new(),
            busy: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> RefreshState {
        if self.busy.load(Ordering::Acquire) {
            RefreshState::Busy
        } else {
            RefreshState::Idle
        }
    }

    /// Single atomic acquire that fails fast; contenders never queue.
    fn try_acquire(&self) -> Option<GuardToken<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then(|| GuardToken { flag: &self.busy })
    }

    /// Run one refresh: fetch candidates from the feed, reconcile them into
    /// the store. Returns immediately with `AlreadyInProgress` when another
    /// run holds the guard.
    pub fn trigger_refresh(&self) -> RefreshOutcome {
        let Some(_token) = self.try_acquire() else {
            info!("refresh already in progress, rejecting trigger");
            return RefreshOutcome::AlreadyInProgress;
        };

        info!("refresh started");

        let candidates = match self.feed.fetch() {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!("refresh failed while fetching: {err}");
                return RefreshOutcome::Failed(err.into());
            }
        };
        info!("fetched {} candidate records", candidates.len());

        let store = match self.store.lock() {
            Ok(store) => store,
            Err(_) => {
                warn!("refresh failed: store lock poisoned");
                return RefreshOutcome::Failed(RefreshError::StoreFailure(
                    "store lock poisoned".to_string(),
                ));
            }
        };

        match self.engine.reconcile(&store, &candidates) {
            Ok(summary) => {
                info!(
                    inserted = summary.inserted,
                    updated = summary.updated,
                    skipped = summary.skipped,
                    "refresh completed"
                );
                RefreshOutcome::Completed(summary)
            }
            Err(err) => {
                warn!("refresh failed while reconciling: {err:#}");
                RefreshOutcome::Failed(RefreshError::StoreFailure(format!("{err:#}")))
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
