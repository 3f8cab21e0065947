pub mod client;
pub mod common;

pub use client::{BoardSession, BoardStore, ConnectionManager};
pub use common::messages::{Board, ClientMessage, ServerMessage};
