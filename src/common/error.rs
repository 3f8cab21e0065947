//! # Error Types
//!
//! Errors raised by the synchronization core. None of them is fatal to a
//! board session: transport errors end one connection attempt and the
//! connection manager schedules the next one.

use thiserror::Error;

/// Failures surfaced by the library.
#[derive(Debug, Error)]
pub enum SyncError {
    /// WebSocket handshake or frame I/O failed
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configured server URL is unusable
    #[error("invalid server URL: {0}")]
    Url(String),

    /// Board create/lookup request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered a board request with a non-success status
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },

    /// A command was refused locally before reaching the wire
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::Url(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
