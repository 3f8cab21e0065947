//! # Client Components
//!
//! The board synchronization core, split by responsibility:
//!
//! ## Board State Store ([`store`])
//! Last confirmed snapshot, our identity, connection status and sort
//! preference. Views only ever read from here.
//!
//! ## Connection Manager ([`manager`])
//! Owns the board channel:
//! - `Join` handshake on every (re)open
//! - Fixed-delay reconnect after abnormal closes
//! - Applies server events to the store in receipt order
//! - Drops commands while the channel is down
//!
//! ## Derived View Engine ([`view`])
//! Pure functions from snapshot + identity + sort mode to what may be shown.
//!
//! ## Timer ([`timer`]) and Undo ([`undo`])
//! Countdown from the absolute `timer_end`, and the 10 second "Undo merge"
//! affordance.
//!
//! ## Board Session ([`session`])
//! One board view wired together, with typed intents for every command.

pub mod api;
pub mod credentials;
pub mod manager;
pub mod session;
pub mod store;
pub mod timer;
pub mod undo;
pub mod view;

// Re-export for convenience
pub use manager::{AliveToken, ConnectionHandle, ConnectionManager, ConnectionPhase, JoinParams};
pub use session::{BoardSession, VoteOutcome};
pub use store::{BoardStore, Identity, StoreState};
pub use timer::{Clock, Countdown, SystemClock, TimerState};
pub use view::{derive_board_view, BoardView, SortMode};
