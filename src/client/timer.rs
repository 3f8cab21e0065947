//! # Discussion Timer
//!
//! Turns the absolute `timer_end` broadcast in every snapshot into a live
//! countdown. The remaining time is always recomputed from the absolute end
//! and the wall clock, never from a local elapsed counter, so every
//! participant shows the same value.
//!
//! ## States
//!
//! ```text
//! Inactive ──(timer_end set)──> Running ──(remaining == 0)──> Expired
//!     ^                            |                             |
//!     └──────(timer_end cleared)───┴─────────────────────────────┘
//! ```
//!
//! Starting or stopping the timer is a command to the server; only the next
//! snapshot changes `timer_end`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::client::manager::AliveToken;
use crate::client::store::BoardStore;
use crate::common::config::SyncSettings;

/// Presets offered to facilitators (seconds).
pub const TIMER_PRESETS: [u32; 5] = [60, 120, 180, 300, 600];

/// Longest duration the server accepts (one hour).
pub const MAX_TIMER_SECS: u32 = 3600;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What the countdown shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// No timer on the board; nothing is rendered
    Inactive,
    Running { remaining_secs: u64, urgent: bool },
    /// Terminal "time's up" until the facilitator starts or stops a timer
    Expired,
}

impl TimerState {
    /// Evaluate the countdown at `now`.
    ///
    /// `remaining = max(0, floor((timer_end - now) / 1000ms))`
    pub fn at(timer_end: Option<DateTime<Utc>>, now: DateTime<Utc>, urgent_threshold_secs: u64) -> Self {
        let Some(end) = timer_end else {
            return TimerState::Inactive;
        };
        let remaining_ms = (end - now).num_milliseconds();
        if remaining_ms < 1000 {
            return TimerState::Expired;
        }
        let remaining_secs = (remaining_ms / 1000) as u64;
        TimerState::Running {
            remaining_secs,
            urgent: remaining_secs <= urgent_threshold_secs,
        }
    }

    pub fn remaining_secs(&self) -> u64 {
        match self {
            TimerState::Running { remaining_secs, .. } => *remaining_secs,
            _ => 0,
        }
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, TimerState::Running { urgent: true, .. })
    }

    /// Whether the countdown needs periodic recomputation.
    fn is_ticking(&self) -> bool {
        matches!(self, TimerState::Running { .. })
    }
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerState::Inactive => Ok(()),
            TimerState::Running { remaining_secs, .. } => {
                write!(f, "{}:{:02}", remaining_secs / 60, remaining_secs % 60)
            }
            TimerState::Expired => write!(f, "Time's up!"),
        }
    }
}

/// Validate a facilitator-chosen duration before it is sent.
pub fn valid_duration(duration_secs: u32) -> bool {
    (1..=MAX_TIMER_SECS).contains(&duration_secs)
}

/// Background countdown bound to one board store.
///
/// Recomputes every tick while a timer is running and whenever the
/// snapshot changes. Dropping the countdown stops it.
pub struct Countdown {
    state: watch::Receiver<TimerState>,
    alive: AliveToken,
    task: JoinHandle<()>,
}

impl Countdown {
    /// Spawn the countdown task. Must be called inside a Tokio runtime.
    pub fn start(store: &BoardStore, clock: Arc<dyn Clock>, settings: &SyncSettings) -> Self {
        let mut store_rx = store.subscribe();
        let tick = settings.tick_interval();
        let threshold = settings.urgent_threshold_secs;
        let alive = AliveToken::new();

        let initial_end = store_rx.borrow_and_update().board.as_ref().and_then(|b| b.timer_end);
        let (state_tx, state) =
            watch::channel(TimerState::at(initial_end, clock.now(), threshold));

        let task_alive = alive.clone();
        let task = tokio::spawn(async move {
            let mut timer_end = initial_end;
            loop {
                let current = TimerState::at(timer_end, clock.now(), threshold);
                if !task_alive.is_alive() {
                    break;
                }
                state_tx.send_if_modified(|s| {
                    let changed = *s != current;
                    *s = current;
                    changed
                });

                let store_changed = if current.is_ticking() {
                    tokio::select! {
                        _ = sleep(tick) => Ok(()),
                        res = store_rx.changed() => res,
                    }
                } else {
                    store_rx.changed().await
                };
                if store_changed.is_err() {
                    debug!("Board store dropped, countdown stops");
                    break;
                }

                let next_end = store_rx.borrow_and_update().board.as_ref().and_then(|b| b.timer_end);
                if next_end != timer_end {
                    debug!("⏱️  Timer end changed to {:?}", next_end);
                    timer_end = next_end;
                }
            }
        });

        Self { state, alive, task }
    }

    pub fn state(&self) -> TimerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.state.clone()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.alive.kill();
        self.task.abort();
    }
}
