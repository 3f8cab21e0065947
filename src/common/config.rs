//! # Configuration Utilities
//!
//! TOML configuration for the board client: who the participant is, which
//! server and board to join, and the timing knobs of the sync engine.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Arguments
/// - `path`: Path to the TOML configuration file
///
/// # Returns
/// - `Ok(T)`: Successfully loaded and parsed configuration
/// - `Err`: File I/O or parsing error
///
/// # Example
/// ```ignore
/// let config: ClientConfig = load_config("config/client.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Complete client configuration.
///
/// # Example TOML
///
/// ```toml
/// [client]
/// name = "Alex"
/// server_url = "http://localhost:3000"
///
/// [board]
/// id = "k2Jd9xQw1p"
///
/// [sync]
/// reconnect_delay_ms = 2000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client: ClientInfo,
    pub board: BoardInfo,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Participant identity and server location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Display name sent in `Join` (may be empty on anonymous boards)
    #[serde(default)]
    pub name: String,
    /// HTTP(S) base URL of the board server (e.g., "http://localhost:3000")
    pub server_url: String,
}

/// Which board to join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardInfo {
    pub id: String,
    /// Possession token returned when the board was created
    #[serde(default)]
    pub facilitator_token: Option<String>,
}

/// Timing of the synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Fixed delay before reconnecting after an abnormal close
    pub reconnect_delay_ms: u64,
    /// How long the "Undo merge" affordance stays available
    pub undo_window_ms: u64,
    /// Countdown recompute interval
    pub tick_interval_ms: u64,
    /// Remaining seconds at or below which the countdown is urgent
    pub urgent_threshold_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 2000,
            undo_window_ms: 10_000,
            tick_interval_ms: 1000,
            urgent_threshold_secs: 30,
        }
    }
}

impl SyncSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn undo_window(&self) -> Duration {
        Duration::from_millis(self.undo_window_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
