//! # Merge Undo Window
//!
//! Client-local, time-boxed "Undo" affordance shown after a merge request.
//! The marker carries no server state: the server alone decides whether an
//! `UndoMerge` still applies (another merge may have happened meanwhile).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::client::manager::AliveToken;

/// A merge was just requested and may still be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingUndo {
    pub expires_at: Instant,
}

/// Holds at most one [`PendingUndo`] and expires it after a fixed window.
pub struct UndoWindow {
    pending: Arc<watch::Sender<Option<PendingUndo>>>,
    generation: Arc<AtomicU64>,
    window: Duration,
    alive: AliveToken,
    expiry: Option<JoinHandle<()>>,
}

impl UndoWindow {
    pub fn new(window: Duration) -> Self {
        let (pending, _) = watch::channel(None);
        Self {
            pending: Arc::new(pending),
            generation: Arc::new(AtomicU64::new(0)),
            window,
            alive: AliveToken::new(),
            expiry: None,
        }
    }

    /// Record that a merge was just sent and restart the expiry.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn arm(&mut self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let expires_at = Instant::now() + self.window;
        self.pending.send_replace(Some(PendingUndo { expires_at }));
        if let Some(previous) = self.expiry.take() {
            previous.abort();
        }

        let pending = self.pending.clone();
        let current = self.generation.clone();
        let alive = self.alive.clone();
        self.expiry = Some(tokio::spawn(async move {
            sleep_until(expires_at).await;
            if alive.is_alive() && current.load(Ordering::Acquire) == generation {
                debug!("Undo window expired");
                pending.send_replace(None);
            }
        }));
    }

    /// Consume the marker if it is still live.
    ///
    /// # Returns
    /// `true` if an `UndoMerge` should be sent.
    pub fn take(&mut self) -> bool {
        let was_pending = self.is_pending();
        self.clear();
        was_pending
    }

    /// Drop the marker without undoing.
    pub fn clear(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(expiry) = self.expiry.take() {
            expiry.abort();
        }
        self.pending.send_if_modified(|p| p.take().is_some());
    }

    pub fn is_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    pub fn pending(&self) -> Option<PendingUndo> {
        *self.pending.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PendingUndo>> {
        self.pending.subscribe()
    }
}

impl Drop for UndoWindow {
    fn drop(&mut self) {
        self.alive.kill();
        if let Some(expiry) = self.expiry.take() {
            expiry.abort();
        }
    }
}
