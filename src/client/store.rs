//! # Board State Store
//!
//! The single source of truth every view reads from: the last snapshot the
//! server confirmed, who we are on this board, whether the channel is up,
//! and the user's preferred sort order.
//!
//! ## Ownership
//!
//! A [`BoardStore`] is an explicit, cloneable handle (one per board view),
//! not ambient global state. Only the connection manager writes server
//! derived state (`set_board`, `set_auth`, `set_connected`); those setters
//! are crate-private. The UI may only change the sort mode, dismiss the
//! error notice, or `reset` the store when leaving the board.
//!
//! ## Change Notification
//!
//! The state lives in a [`tokio::sync::watch`] channel. Every effective
//! change wakes subscribers; writing an identical snapshot does not.

use std::sync::Arc;

use log::debug;
use tokio::sync::watch;

use crate::client::view::{derive_board_view, BoardView, SortMode};
use crate::common::messages::Board;

/// Identity issued by the server in `Authenticated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub participant_id: String,
    pub is_facilitator: bool,
}

/// Everything a view needs to render a board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    /// Last confirmed snapshot (None until the first `BoardState`)
    pub board: Option<Arc<Board>>,
    /// Our identity (None until `Authenticated`)
    pub identity: Option<Identity>,
    /// Whether the board channel is currently open
    pub connected: bool,
    /// Preferred ticket order
    pub sort_mode: SortMode,
    /// Most recent server rejection, kept for a transient notice
    pub last_error: Option<String>,
}

impl StoreState {
    /// Derive the renderable view from this state.
    ///
    /// # Returns
    /// `None` until the first snapshot has arrived ("Connecting…").
    pub fn view(&self) -> Option<BoardView> {
        let board = self.board.as_deref()?;
        let viewer = self.identity.as_ref();
        Some(derive_board_view(board, viewer, self.sort_mode))
    }
}

/// Cloneable handle onto one board view's state.
#[derive(Debug, Clone)]
pub struct BoardStore {
    state: Arc<watch::Sender<StoreState>>,
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Copy of the current state. Cheap: the board is behind an `Arc`.
    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    pub fn board(&self) -> Option<Arc<Board>> {
        self.state.borrow().board.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    pub fn sort_mode(&self) -> SortMode {
        self.state.borrow().sort_mode
    }

    /// Derived view of the current state (see [`StoreState::view`]).
    pub fn view(&self) -> Option<BoardView> {
        self.state.borrow().view()
    }

    /// Receive a notification on every effective change.
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    // ------------------------------------------------------------------
    // Connection manager surface
    // ------------------------------------------------------------------

    /// Replace the snapshot wholesale.
    ///
    /// # Returns
    /// `true` if the snapshot differed from the one already held.
    pub(crate) fn set_board(&self, board: Board) -> bool {
        self.state.send_if_modified(|state| {
            if state.board.as_deref() == Some(&board) {
                return false;
            }
            debug!(
                "Applying snapshot of board '{}' ({} columns)",
                board.id,
                board.columns.len()
            );
            state.board = Some(Arc::new(board));
            true
        })
    }

    pub(crate) fn set_auth(&self, participant_id: String, is_facilitator: bool) {
        let identity = Identity {
            participant_id,
            is_facilitator,
        };
        self.state.send_if_modified(|state| {
            if state.identity.as_ref() == Some(&identity) {
                return false;
            }
            state.identity = Some(identity);
            true
        });
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.connected != connected;
            state.connected = connected;
            changed
        });
    }

    pub(crate) fn set_error(&self, message: String) {
        self.state.send_modify(|state| state.last_error = Some(message));
    }

    // ------------------------------------------------------------------
    // UI surface
    // ------------------------------------------------------------------

    pub fn set_sort_mode(&self, mode: SortMode) {
        self.state.send_if_modified(|state| {
            let changed = state.sort_mode != mode;
            state.sort_mode = mode;
            changed
        });
    }

    /// Dismiss the transient error notice.
    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| state.last_error.take().is_some());
    }

    /// Forget everything. Called when leaving the board.
    pub fn reset(&self) {
        self.state.send_replace(StoreState::default());
    }
}
