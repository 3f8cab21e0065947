//! # Board Session
//!
//! Everything one open board view owns, wired together:
//!
//! - a [`BoardStore`] holding the last confirmed snapshot
//! - a [`ConnectionManager`] keeping the board channel alive
//! - a [`Countdown`] driven by the snapshot's `timer_end`
//! - an [`UndoWindow`] for the most recent merge
//!
//! The intent methods are the only way the UI talks to the server. They
//! validate locally, send one command and return at once. Nothing is
//! applied optimistically: the board changes only when the server
//! broadcasts the next snapshot.

use std::ops::RangeInclusive;
use std::sync::Arc;

use log::{debug, info};

use crate::client::manager::{ConnectionManager, ConnectionPhase, JoinParams};
use crate::client::store::BoardStore;
use crate::client::timer::{valid_duration, Clock, Countdown, TimerState, MAX_TIMER_SECS};
use crate::client::undo::UndoWindow;
use crate::client::view::{can_vote, column_vote_state, parse_segments, raw_segment_index};
use crate::common::config::SyncSettings;
use crate::common::connection::Connector;
use crate::common::error::{Result, SyncError};
use crate::common::messages::ClientMessage;

/// Per-column vote limits a facilitator may choose.
pub const VOTE_LIMIT_RANGE: RangeInclusive<u32> = 1..=10;

/// Limit applied when a facilitator switches the vote limit on.
pub const DEFAULT_VOTE_LIMIT: u32 = 3;

/// What happened to a vote toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Handed to the open channel
    Sent,
    /// Channel not open; nothing was sent
    Dropped,
    /// Column budget spent and the viewer has not voted on this ticket
    Blocked,
}

/// One board view: store, connection, countdown and undo marker.
pub struct BoardSession {
    store: BoardStore,
    connections: ConnectionManager,
    undo: UndoWindow,
    countdown: Option<Countdown>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl BoardSession {
    /// # Arguments
    /// - `connector`: Opens the board channel on every attempt
    /// - `settings`: Reconnect delay, undo window and countdown timing
    /// - `clock`: Wall clock for the countdown
    pub fn new(connector: Arc<dyn Connector>, settings: SyncSettings, clock: Arc<dyn Clock>) -> Self {
        let store = BoardStore::new();
        let connections = ConnectionManager::new(connector, store.clone(), settings.clone());
        let undo = UndoWindow::new(settings.undo_window());
        Self {
            store,
            connections,
            undo,
            countdown: None,
            clock,
            settings,
        }
    }

    /// Open (or switch to) a board.
    ///
    /// Joining a different board or with a different name resets the store
    /// so nothing from the previous board leaks into the new view.
    pub async fn join(&mut self, params: JoinParams) {
        let switching = self
            .connections
            .handle()
            .map(|h| h.params() != &params)
            .unwrap_or(false);
        if switching {
            self.leave().await;
        }

        self.connections.connect(params).await;
        if self.countdown.is_none() {
            self.countdown = Some(Countdown::start(&self.store, self.clock.clone(), &self.settings));
        }
    }

    /// Tear the view down: no reconnect, no further store writes.
    pub async fn leave(&mut self) {
        self.connections.disconnect().await;
        self.countdown = None;
        self.undo.clear();
        self.store.reset();
        debug!("Board session left");
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.connections.phase()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Current countdown, `Inactive` while no board is joined.
    pub fn timer(&self) -> TimerState {
        self.countdown
            .as_ref()
            .map(|c| c.state())
            .unwrap_or(TimerState::Inactive)
    }

    pub fn countdown(&self) -> Option<&Countdown> {
        self.countdown.as_ref()
    }

    /// Whether the "Undo merge" affordance is showing.
    pub fn undo_available(&self) -> bool {
        self.undo.is_pending()
    }

    pub fn undo_window(&self) -> &UndoWindow {
        &self.undo
    }

    // ========================================================================
    // TICKETS
    // ========================================================================

    pub fn add_ticket(&self, column_id: &str, content: &str) -> Result<bool> {
        let content = non_empty(content)?;
        Ok(self.send(ClientMessage::AddTicket {
            column_id: column_id.to_string(),
            content,
        }))
    }

    pub fn edit_ticket(&self, ticket_id: &str, content: &str) -> Result<bool> {
        let content = non_empty(content)?;
        Ok(self.send(ClientMessage::EditTicket {
            ticket_id: ticket_id.to_string(),
            content,
        }))
    }

    pub fn remove_ticket(&self, ticket_id: &str) -> bool {
        self.send(ClientMessage::RemoveTicket {
            ticket_id: ticket_id.to_string(),
        })
    }

    /// Toggle the viewer's vote on a ticket.
    ///
    /// Adding a vote in a column whose budget is spent is refused locally;
    /// removing one is always sent.
    pub fn toggle_vote(&self, ticket_id: &str) -> VoteOutcome {
        let state = self.store.snapshot();
        if let Some(board) = state.board.as_deref() {
            if let Some(column) = board.column_of(ticket_id) {
                let participant_id = state.identity.as_ref().map(|i| i.participant_id.as_str());
                let votes = column_vote_state(column, participant_id, board.vote_limit_per_column);
                let blocked = board
                    .ticket(ticket_id)
                    .map(|ticket| !can_vote(ticket, participant_id, &votes))
                    .unwrap_or(false);
                if blocked {
                    debug!("Vote on '{}' blocked: column limit reached", ticket_id);
                    return VoteOutcome::Blocked;
                }
            }
        }

        if self.send(ClientMessage::ToggleVote {
            ticket_id: ticket_id.to_string(),
        }) {
            VoteOutcome::Sent
        } else {
            VoteOutcome::Dropped
        }
    }

    // ========================================================================
    // FACILITATOR CONTROLS
    // ========================================================================

    pub fn toggle_blur(&self) -> bool {
        self.send(ClientMessage::ToggleBlur)
    }

    pub fn toggle_hide_votes(&self) -> bool {
        self.send(ClientMessage::ToggleHideVotes)
    }

    /// Set or clear the per-column vote limit.
    pub fn set_vote_limit(&self, limit: Option<u32>) -> Result<bool> {
        if let Some(l) = limit {
            if !VOTE_LIMIT_RANGE.contains(&l) {
                return Err(SyncError::InvalidCommand(format!(
                    "vote limit must be between {} and {}",
                    VOTE_LIMIT_RANGE.start(),
                    VOTE_LIMIT_RANGE.end()
                )));
            }
        }
        Ok(self.send(ClientMessage::SetVoteLimit { limit }))
    }

    /// Switch the vote limit off, or on at [`DEFAULT_VOTE_LIMIT`].
    pub fn toggle_vote_limit(&self) -> Result<bool> {
        let current = self.store.board().and_then(|b| b.vote_limit_per_column);
        match current {
            Some(_) => self.set_vote_limit(None),
            None => self.set_vote_limit(Some(DEFAULT_VOTE_LIMIT)),
        }
    }

    pub fn start_timer(&self, duration_secs: u32) -> Result<bool> {
        if !valid_duration(duration_secs) {
            return Err(SyncError::InvalidCommand(format!(
                "timer duration must be between 1 and {} seconds",
                MAX_TIMER_SECS
            )));
        }
        Ok(self.send(ClientMessage::StartTimer { duration_secs }))
    }

    pub fn stop_timer(&self) -> bool {
        self.send(ClientMessage::StopTimer)
    }

    // ========================================================================
    // MERGE / SPLIT / UNDO
    // ========================================================================

    /// Fold `source` into `target` and offer an undo if the request was
    /// queued for the open channel.
    pub fn merge_tickets(&mut self, source_ticket_id: &str, target_ticket_id: &str) -> Result<bool> {
        if source_ticket_id == target_ticket_id {
            return Err(SyncError::InvalidCommand(
                "cannot merge a ticket into itself".to_string(),
            ));
        }
        let sent = self.send(ClientMessage::MergeTickets {
            source_ticket_id: source_ticket_id.to_string(),
            target_ticket_id: target_ticket_id.to_string(),
        });
        if sent {
            info!("🔗 Merge requested: '{}' into '{}'", source_ticket_id, target_ticket_id);
            self.undo.arm();
        }
        Ok(sent)
    }

    /// Ask the server to revert the last merge.
    ///
    /// # Returns
    /// `false` once the undo window has expired or was already used.
    pub fn undo_merge(&mut self) -> bool {
        if !self.undo.take() {
            debug!("No merge to undo");
            return false;
        }
        self.send(ClientMessage::UndoMerge)
    }

    /// Extract one segment of a merged ticket.
    ///
    /// `segment_index` counts the segments shown by
    /// [`parse_segments`]. The command carries the position in the raw
    /// separator split, blank segments included.
    pub fn split_ticket(&self, ticket_id: &str, segment_index: usize) -> Result<bool> {
        let board = self
            .store
            .board()
            .ok_or_else(|| SyncError::InvalidCommand("no board loaded".to_string()))?;
        let ticket = board
            .ticket(ticket_id)
            .ok_or_else(|| SyncError::InvalidCommand(format!("unknown ticket '{}'", ticket_id)))?;
        let segments = parse_segments(&ticket.content).len();
        if segments < 2 {
            return Err(SyncError::InvalidCommand(format!(
                "ticket '{}' is not merged",
                ticket_id
            )));
        }
        let raw_index = raw_segment_index(&ticket.content, segment_index).ok_or_else(|| {
            SyncError::InvalidCommand(format!(
                "segment {} out of range (ticket has {})",
                segment_index, segments
            ))
        })?;
        Ok(self.send(ClientMessage::SplitTicket {
            ticket_id: ticket_id.to_string(),
            segment_index: raw_index,
        }))
    }

    fn send(&self, message: ClientMessage) -> bool {
        self.connections.send(message)
    }
}

fn non_empty(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidCommand("ticket content is empty".to_string()));
    }
    Ok(trimmed.to_string())
}
