//! # Derived View Engine
//!
//! Pure, deterministic functions from (snapshot, viewer identity, sort mode)
//! to what a board view may render:
//!
//! - **Sort**: display order per column; the stored order is never touched
//! - **Visibility masking**: blurred content and author names are removed,
//!   not merely flagged, so they cannot leak into rendered output
//! - **Vote-limit gating**: per-column vote budget of the viewer
//! - **Merge segments**: detection of tickets produced by a merge
//!
//! Nothing here caches. Every store change re-derives from scratch.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::store::Identity;
use crate::common::messages::{Board, Column, Ticket};

/// Line-based separator joining the contents of merged tickets.
pub const MERGE_SEPARATOR: &str = "\n---\n";

// ============================================================================
// SORT
// ============================================================================

/// Display order of tickets inside a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    /// Newest first
    #[default]
    Newest,
    /// Most votes first, newest first among equals
    MostVotes,
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortMode::Newest => write!(f, "newest"),
            SortMode::MostVotes => write!(f, "most-votes"),
        }
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(SortMode::Newest),
            "most-votes" | "votes" | "top" => Ok(SortMode::MostVotes),
            other => Err(format!("unknown sort mode '{}'", other)),
        }
    }
}

/// The sort mode actually applied: hidden votes must not leak through ordering.
pub fn effective_sort_mode(board: &Board, preferred: SortMode) -> SortMode {
    if board.hide_votes {
        SortMode::Newest
    } else {
        preferred
    }
}

/// Order tickets for display without mutating the stored order.
pub fn sort_tickets(tickets: &[Ticket], mode: SortMode) -> Vec<&Ticket> {
    let mut sorted: Vec<&Ticket> = tickets.iter().collect();
    match mode {
        SortMode::MostVotes => {
            sorted.sort_by_key(|t| (Reverse(t.votes.len()), Reverse(t.created_at)))
        }
        SortMode::Newest => sorted.sort_by_key(|t| Reverse(t.created_at)),
    }
    sorted
}

// ============================================================================
// VOTE LIMIT
// ============================================================================

/// The viewer's vote budget in one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnVoteState {
    /// Votes the viewer has cast among this column's tickets
    pub my_votes: usize,
    /// Board-wide per-column limit
    pub limit: Option<u32>,
    /// No further *new* votes allowed in this column
    pub limit_reached: bool,
}

/// Count the viewer's votes in `column` and compare against `limit`.
pub fn column_vote_state(
    column: &Column,
    participant_id: Option<&str>,
    limit: Option<u32>,
) -> ColumnVoteState {
    let my_votes = participant_id
        .map(|id| column.tickets.iter().filter(|t| t.has_vote_from(id)).count())
        .unwrap_or(0);
    let limit_reached = limit
        .map(|l| my_votes >= l as usize)
        .unwrap_or(false);
    ColumnVoteState {
        my_votes,
        limit,
        limit_reached,
    }
}

/// Whether the vote toggle for `ticket` is enabled.
///
/// Removing an existing vote is always allowed; adding one is blocked once
/// the column budget is spent.
pub fn can_vote(ticket: &Ticket, participant_id: Option<&str>, state: &ColumnVoteState) -> bool {
    let has_voted = participant_id
        .map(|id| ticket.has_vote_from(id))
        .unwrap_or(false);
    has_voted || !state.limit_reached
}

// ============================================================================
// MERGE SEGMENTS
// ============================================================================

/// Split ticket content into its merged segments.
///
/// Blank segments are dropped. Content without any separator (or with
/// nothing but blanks) is a single segment.
pub fn parse_segments(content: &str) -> Vec<&str> {
    let segments: Vec<&str> = content
        .split(MERGE_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        vec![content]
    } else {
        segments
    }
}

/// Map a position in [`parse_segments`] to its position in the raw
/// separator split of `content`, which still counts blank segments.
///
/// # Example
/// ```
/// use retro_sync::client::view::raw_segment_index;
///
/// assert_eq!(raw_segment_index("A\n---\n\n---\nB", 1), Some(2));
/// assert_eq!(raw_segment_index("A\n---\nB", 2), None);
/// ```
pub fn raw_segment_index(content: &str, segment_index: usize) -> Option<usize> {
    content
        .split(MERGE_SEPARATOR)
        .enumerate()
        .filter(|(_, s)| !s.trim().is_empty())
        .nth(segment_index)
        .map(|(raw, _)| raw)
}

/// A ticket is merged iff it has more than one non-empty segment.
pub fn is_merged(content: &str) -> bool {
    parse_segments(content).len() > 1
}

// ============================================================================
// VISIBILITY + FULL VIEW
// ============================================================================

/// Ticket text as the viewer may see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketContent {
    Visible { text: String, segments: Vec<String> },
    /// Blurred for this viewer; the text is not carried at all
    Masked,
}

/// One ticket, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketView {
    pub id: String,
    pub content: TicketContent,
    /// Author display name; None when anonymous or masked
    pub author: Option<String>,
    /// None when the board hides vote counts
    pub vote_count: Option<usize>,
    pub has_voted: bool,
    pub can_vote: bool,
    pub is_author: bool,
    pub can_edit: bool,
    pub can_remove: bool,
    pub can_split: bool,
    pub created_at: DateTime<Utc>,
}

impl TicketView {
    pub fn is_masked(&self) -> bool {
        matches!(self.content, TicketContent::Masked)
    }

    pub fn is_merged(&self) -> bool {
        matches!(&self.content, TicketContent::Visible { segments, .. } if segments.len() > 1)
    }
}

/// One column in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnView {
    pub id: String,
    pub name: String,
    pub tickets: Vec<TicketView>,
    pub votes: ColumnVoteState,
    /// `(my_votes, limit)` badge; None without a limit or when votes are hidden
    pub vote_badge: Option<(usize, u32)>,
}

/// The whole board as the viewer may see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardView {
    pub id: String,
    pub title: String,
    pub columns: Vec<ColumnView>,
    pub is_blurred: bool,
    pub is_anonymous: bool,
    pub hide_votes: bool,
    /// Sort mode after the `hide_votes` override
    pub sort_mode: SortMode,
    pub vote_limit: Option<u32>,
    pub timer_end: Option<DateTime<Utc>>,
    pub participant_count: usize,
    pub is_facilitator: bool,
}

/// Whether `ticket`'s content and author are hidden from `viewer`.
pub fn is_masked_for(board: &Board, ticket: &Ticket, viewer: Option<&Identity>) -> bool {
    let is_author = viewer
        .map(|v| v.participant_id == ticket.author_id)
        .unwrap_or(false);
    board.is_blurred && !is_author
}

fn ticket_view(
    board: &Board,
    ticket: &Ticket,
    viewer: Option<&Identity>,
    votes: &ColumnVoteState,
) -> TicketView {
    let participant_id = viewer.map(|v| v.participant_id.as_str());
    let is_facilitator = viewer.map(|v| v.is_facilitator).unwrap_or(false);
    let is_author = participant_id == Some(ticket.author_id.as_str());
    let masked = is_masked_for(board, ticket, viewer);

    let content = if masked {
        TicketContent::Masked
    } else {
        TicketContent::Visible {
            text: ticket.content.clone(),
            segments: parse_segments(&ticket.content)
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    };
    let author = if masked || board.is_anonymous {
        None
    } else {
        Some(ticket.author_name.clone())
    };
    let merged = !masked && is_merged(&ticket.content);

    TicketView {
        id: ticket.id.clone(),
        content,
        author,
        vote_count: (!board.hide_votes).then(|| ticket.votes.len()),
        has_voted: participant_id
            .map(|id| ticket.has_vote_from(id))
            .unwrap_or(false),
        can_vote: can_vote(ticket, participant_id, votes),
        is_author,
        can_edit: is_author,
        can_remove: is_author || is_facilitator,
        can_split: merged && (is_author || is_facilitator),
        created_at: ticket.created_at,
    }
}

/// Derive the complete renderable board.
///
/// # Arguments
/// - `board`: Last confirmed snapshot
/// - `viewer`: Our identity, if `Authenticated` has arrived
/// - `preferred`: The user's stored sort preference
pub fn derive_board_view(
    board: &Board,
    viewer: Option<&Identity>,
    preferred: SortMode,
) -> BoardView {
    let sort_mode = effective_sort_mode(board, preferred);
    let participant_id = viewer.map(|v| v.participant_id.as_str());

    let columns = board
        .columns
        .iter()
        .map(|column| {
            let votes = column_vote_state(column, participant_id, board.vote_limit_per_column);
            let tickets = sort_tickets(&column.tickets, sort_mode)
                .into_iter()
                .map(|ticket| ticket_view(board, ticket, viewer, &votes))
                .collect();
            let vote_badge = match (votes.limit, board.hide_votes) {
                (Some(limit), false) => Some((votes.my_votes, limit)),
                _ => None,
            };
            ColumnView {
                id: column.id.clone(),
                name: column.name.clone(),
                tickets,
                votes,
                vote_badge,
            }
        })
        .collect();

    BoardView {
        id: board.id.clone(),
        title: board.title.clone(),
        columns,
        is_blurred: board.is_blurred,
        is_anonymous: board.is_anonymous,
        hide_votes: board.hide_votes,
        sort_mode,
        vote_limit: board.vote_limit_per_column,
        timer_end: board.timer_end,
        participant_count: board.participant_count,
        is_facilitator: viewer.map(|v| v.is_facilitator).unwrap_or(false),
    }
}
