//! # Message Protocol
//!
//! Defines the board data model and every message exchanged between a board
//! client and the authoritative board server:
//! - Client commands (join, ticket edits, votes, facilitator controls, merge/split)
//! - Server events (full board snapshots, join confirmation, non-fatal errors)
//!
//! Messages are JSON text frames shaped as `{"type": <Tag>, "payload": {...}}`.
//! Commands without fields omit `payload` entirely.
//!
//! ## Delivery Contract
//!
//! Commands are fire-and-forget: the server never acknowledges a single
//! command. The next [`ServerMessage::BoardState`] snapshot is what confirms
//! (or silently discards) an intent.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::Result;

// ============================================================================
// DATA MODEL - Delivered wholesale inside every snapshot
// ============================================================================

/// One retrospective board, exactly as last confirmed by the server.
///
/// A `Board` is never patched on the client. Every push from the server
/// replaces the previous value in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Board identifier, also the key of the WebSocket path
    pub id: String,
    /// Human readable title
    pub title: String,
    /// Columns in server-defined order
    pub columns: Vec<Column>,
    /// Whether other participants' tickets are masked
    pub is_blurred: bool,
    /// Whether author names are omitted for everybody
    #[serde(default)]
    pub is_anonymous: bool,
    /// Whether vote counts must stay hidden (also forces "newest" ordering)
    #[serde(default)]
    pub hide_votes: bool,
    /// Maximum votes a participant may cast per column (None = unlimited)
    #[serde(default)]
    pub vote_limit_per_column: Option<u32>,
    /// Absolute end of the discussion timer (None = no timer)
    #[serde(default)]
    pub timer_end: Option<DateTime<Utc>>,
    /// Number of currently connected participants
    #[serde(default)]
    pub participant_count: usize,
    /// When the board was created
    pub created_at: DateTime<Utc>,
}

impl Board {
    /// Find the column that currently holds `ticket_id`.
    pub fn column_of(&self, ticket_id: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|column| column.tickets.iter().any(|t| t.id == ticket_id))
    }

    /// Find a ticket anywhere on the board.
    pub fn ticket(&self, ticket_id: &str) -> Option<&Ticket> {
        self.columns
            .iter()
            .flat_map(|column| column.tickets.iter())
            .find(|t| t.id == ticket_id)
    }
}

/// A board column. Ticket order is insertion order as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub name: String,
    pub tickets: Vec<Ticket>,
}

/// A single card on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    /// Text content; merged tickets hold several segments joined by
    /// [`MERGE_SEPARATOR`](crate::client::view::MERGE_SEPARATOR)
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    /// Participant ids that voted for this ticket (a set: one vote per participant)
    #[serde(default)]
    pub votes: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Whether `participant_id` has voted for this ticket.
    pub fn has_vote_from(&self, participant_id: &str) -> bool {
        self.votes.contains(participant_id)
    }
}

// ============================================================================
// CLIENT -> SERVER COMMANDS
// ============================================================================

/// Intents a client can issue over the board channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// **Join**
    ///
    /// First frame on every (re)opened connection.
    ///
    /// # Fields
    /// - `participant_name`: Display name chosen by the user
    /// - `facilitator_token`: Possession token granting facilitator rights
    /// - `participant_id`: Identity issued by a previous `Authenticated`,
    ///   re-sent after a reconnect so votes and authorship stay attributed
    Join {
        participant_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        facilitator_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant_id: Option<String>,
    },

    AddTicket { column_id: String, content: String },

    RemoveTicket { ticket_id: String },

    EditTicket { ticket_id: String, content: String },

    /// Add the sender's vote, or remove it if already present.
    ToggleVote { ticket_id: String },

    ToggleBlur,

    ToggleHideVotes,

    /// `limit: None` removes the limit (serialised as `null`).
    SetVoteLimit { limit: Option<u32> },

    StartTimer { duration_secs: u32 },

    StopTimer,

    /// Fold `source_ticket_id` into `target_ticket_id`.
    MergeTickets {
        source_ticket_id: String,
        target_ticket_id: String,
    },

    /// Extract segment `segment_index` of a merged ticket into its own ticket.
    SplitTicket {
        ticket_id: String,
        segment_index: usize,
    },

    UndoMerge,
}

impl ClientMessage {
    /// Serialize the command into a single JSON text frame.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Short tag used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "Join",
            ClientMessage::AddTicket { .. } => "AddTicket",
            ClientMessage::RemoveTicket { .. } => "RemoveTicket",
            ClientMessage::EditTicket { .. } => "EditTicket",
            ClientMessage::ToggleVote { .. } => "ToggleVote",
            ClientMessage::ToggleBlur => "ToggleBlur",
            ClientMessage::ToggleHideVotes => "ToggleHideVotes",
            ClientMessage::SetVoteLimit { .. } => "SetVoteLimit",
            ClientMessage::StartTimer { .. } => "StartTimer",
            ClientMessage::StopTimer => "StopTimer",
            ClientMessage::MergeTickets { .. } => "MergeTickets",
            ClientMessage::SplitTicket { .. } => "SplitTicket",
            ClientMessage::UndoMerge => "UndoMerge",
        }
    }
}

// ============================================================================
// SERVER -> CLIENT EVENTS
// ============================================================================

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// **Board State**
    ///
    /// Complete snapshot superseding all earlier state. Applying the same
    /// snapshot twice is a no-op.
    BoardState { board: Board },

    /// **Authenticated**
    ///
    /// Sent once per successful `Join`. May arrive before or after the first
    /// `BoardState`.
    Authenticated {
        participant_id: String,
        is_facilitator: bool,
    },

    /// **Error**
    ///
    /// Non-fatal rejection. The connection stays open and nothing is retried.
    Error { message: String },
}

/// Event tags this client understands. Anything else is ignored.
const KNOWN_EVENTS: [&str; 3] = ["BoardState", "Authenticated", "Error"];

impl ServerMessage {
    /// Decode a text frame received from the server.
    ///
    /// # Returns
    /// - `Ok(Some(msg))`: A recognised event
    /// - `Ok(None)`: Well-formed JSON carrying an event type this client does not know
    /// - `Err`: The frame is not valid JSON or a known event has a malformed payload
    ///
    /// # Example
    /// ```ignore
    /// match ServerMessage::from_text(&frame)? {
    ///     Some(ServerMessage::BoardState { board }) => store.set_board(board),
    ///     Some(other) => handle(other),
    ///     None => {} // newer server, unknown event
    /// }
    /// ```
    pub fn from_text(text: &str) -> Result<Option<Self>> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let known = value
            .get("type")
            .and_then(|tag| tag.as_str())
            .map(|tag| KNOWN_EVENTS.contains(&tag))
            .unwrap_or(false);
        if !known {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Serialize the event into a JSON text frame.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
