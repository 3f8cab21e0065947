//! # Common Components
//!
//! Shared plumbing used by the synchronization core and the terminal client.
//!
//! ## Modules
//!
//! - [`messages`]: Board data model and the client/server message protocol
//! - [`connection`]: Transport abstraction and the WebSocket board channel
//! - [`config`]: Configuration parsing utilities
//! - [`error`]: Library error type

pub mod messages;
pub mod connection;
pub mod config;
pub mod error;
