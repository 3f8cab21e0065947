//! # Connection Manager
//!
//! Owns the one live board channel of a board view and keeps it alive.
//!
//! ## Responsibilities
//!
//! - **Join handshake**: every freshly opened channel immediately sends `Join`
//! - **Reconciliation**: incoming events are applied to the [`BoardStore`]
//!   in receipt order; each `BoardState` replaces the previous snapshot
//! - **Reconnect**: after an abnormal close or a failed attempt the channel
//!   is re-opened after a fixed delay (2000 ms by default), indefinitely
//! - **Send gating**: [`ConnectionHandle::send`] silently drops commands
//!   unless the channel is open; callers never wait for delivery
//! - **Teardown**: flipping the [`AliveToken`] cancels the pending retry,
//!   closes the channel and fences every later store write
//!
//! ## State Machine
//!
//! ```text
//! Disconnected ──> Connecting ──> Open ──(Authenticated)──> Authenticated
//!      ^               |           |                             |
//!      └──(retry delay)┴───────────┴──────(close / error)────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::client::store::BoardStore;
use crate::common::config::SyncSettings;
use crate::common::connection::{Connector, Transport};
use crate::common::error::Result;
use crate::common::messages::{ClientMessage, ServerMessage};

// ============================================================================
// ALIVE TOKEN - Cancellation shared by every async callback of a board view
// ============================================================================

/// "Still alive" guard for asynchronous work belonging to one board view.
///
/// Cancellation is a single flag flip: [`kill`](Self::kill) clears the flag
/// and wakes everything parked in [`cancelled`](Self::cancelled).
#[derive(Debug, Clone)]
pub struct AliveToken {
    alive: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for AliveToken {
    fn default() -> Self {
        Self::new()
    }
}

impl AliveToken {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Resolves once the token has been killed.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if !self.is_alive() {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// CONNECTION STATE
// ============================================================================

/// Lifecycle phase of the board channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No channel; a retry may be scheduled
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// Channel open and `Join` sent, identity not yet confirmed
    Open,
    /// Server confirmed our identity
    Authenticated,
}

impl ConnectionPhase {
    /// Whether commands may be written to the channel.
    pub fn accepts_commands(&self) -> bool {
        matches!(self, ConnectionPhase::Open | ConnectionPhase::Authenticated)
    }
}

/// Who joins which board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    pub board_id: String,
    pub participant_name: String,
    pub facilitator_token: Option<String>,
}

/// Why a single connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Transport closed or failed; schedule a retry
    Lost,
    /// Owner tore the view down; never reconnect
    Shutdown,
}

// ============================================================================
// CONNECTION HANDLE - One live channel for one (board, participant) pair
// ============================================================================

/// Handle onto a running connection loop.
///
/// Dropping the handle tears the connection down.
pub struct ConnectionHandle {
    params: JoinParams,
    commands: mpsc::UnboundedSender<ClientMessage>,
    phase: watch::Receiver<ConnectionPhase>,
    alive: AliveToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    /// Spawn the connection loop for `params`.
    ///
    /// # Arguments
    /// - `connector`: Opens a transport per attempt
    /// - `store`: Receives snapshots, identity and connection status
    /// - `params`: Board id, display name and optional facilitator token
    /// - `settings`: Reconnect delay
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(
        connector: Arc<dyn Connector>,
        store: BoardStore,
        params: JoinParams,
        settings: &SyncSettings,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase) = watch::channel(ConnectionPhase::Disconnected);
        let alive = AliveToken::new();

        let worker = ConnectionLoop {
            connector,
            store,
            params: params.clone(),
            retry_delay: settings.reconnect_delay(),
            commands: commands_rx,
            phase: phase_tx,
            alive: alive.clone(),
            issued_id: None,
        };
        let task = tokio::spawn(worker.run());

        Self {
            params,
            commands,
            phase,
            alive,
            task: Some(task),
        }
    }

    pub fn params(&self) -> &JoinParams {
        &self.params
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.clone()
    }

    /// Fire-and-forget a command.
    ///
    /// # Returns
    /// `true` if the command was queued for the open channel, `false` if it
    /// was dropped because the channel is not open. A queued command is
    /// still discarded if the channel closes before the loop writes it.
    pub fn send(&self, message: ClientMessage) -> bool {
        if !self.alive.is_alive() || !self.phase().accepts_commands() {
            debug!(
                "Dropping {} for board '{}': channel not open",
                message.kind(),
                self.params.board_id
            );
            return false;
        }
        self.commands.send(message).is_ok()
    }

    /// Tear down and wait until the loop has exited.
    pub async fn shutdown(mut self) {
        self.alive.kill();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("❌ Connection loop for board '{}' panicked: {}", self.params.board_id, e);
                }
            }
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.alive.kill();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// CONNECTION LOOP
// ============================================================================

struct ConnectionLoop {
    connector: Arc<dyn Connector>,
    store: BoardStore,
    params: JoinParams,
    retry_delay: std::time::Duration,
    commands: mpsc::UnboundedReceiver<ClientMessage>,
    phase: watch::Sender<ConnectionPhase>,
    alive: AliveToken,
    /// Identity issued by the server, re-sent on reconnect
    issued_id: Option<String>,
}

impl ConnectionLoop {
    async fn run(mut self) {
        let board_id = self.params.board_id.clone();
        let mut attempt: u64 = 0;

        loop {
            if !self.alive.is_alive() {
                break;
            }
            attempt += 1;
            self.set_phase(ConnectionPhase::Connecting);
            info!("🔌 Connecting to board '{}' (attempt {})", board_id, attempt);

            let connected = tokio::select! {
                res = self.connector.connect(&board_id) => Some(res),
                _ = self.alive.cancelled() => None,
            };

            let end = match connected {
                None => SessionEnd::Shutdown,
                Some(Ok(transport)) => {
                    attempt = 0;
                    self.run_session(transport).await
                }
                Some(Err(e)) => {
                    warn!("⚠️  Could not open board '{}': {}", board_id, e);
                    SessionEnd::Lost
                }
            };

            if end == SessionEnd::Shutdown || !self.alive.is_alive() {
                break;
            }

            self.guarded(|store| store.set_connected(false));
            self.set_phase(ConnectionPhase::Disconnected);
            info!(
                "🔄 Board '{}' disconnected, reconnecting in {}ms",
                board_id,
                self.retry_delay.as_millis()
            );

            tokio::select! {
                _ = sleep(self.retry_delay) => {}
                _ = self.alive.cancelled() => break,
            }
        }

        self.set_phase(ConnectionPhase::Disconnected);
        debug!("Connection loop for board '{}' exited", board_id);
    }

    /// Drive one open transport until it ends.
    async fn run_session(&mut self, mut transport: Box<dyn Transport>) -> SessionEnd {
        // Commands queued for an earlier channel are stale
        while self.commands.try_recv().is_ok() {}

        if !self.alive.is_alive() {
            let _ = transport.close().await;
            return SessionEnd::Shutdown;
        }

        self.set_phase(ConnectionPhase::Open);
        self.guarded(|store| store.set_connected(true));

        let join = ClientMessage::Join {
            participant_name: self.params.participant_name.clone(),
            facilitator_token: self.params.facilitator_token.clone(),
            participant_id: self.issued_id.clone(),
        };
        if let Err(e) = write(&mut *transport, &join).await {
            warn!("⚠️  Failed to send Join to board '{}': {}", self.params.board_id, e);
            return SessionEnd::Lost;
        }
        info!(
            "📤 Joined board '{}' as '{}'",
            self.params.board_id, self.params.participant_name
        );

        loop {
            tokio::select! {
                _ = self.alive.cancelled() => {
                    let _ = transport.close().await;
                    return SessionEnd::Shutdown;
                }

                cmd = self.commands.recv() => match cmd {
                    Some(message) => {
                        if let Err(e) = write(&mut *transport, &message).await {
                            warn!("⚠️  Send of {} failed: {}", message.kind(), e);
                            return SessionEnd::Lost;
                        }
                    }
                    // Handle dropped
                    None => {
                        let _ = transport.close().await;
                        return SessionEnd::Shutdown;
                    }
                },

                incoming = transport.recv() => match incoming {
                    Some(Ok(text)) => self.handle_frame(&text),
                    Some(Err(e)) => {
                        warn!("⚠️  Board channel error: {}", e);
                        return SessionEnd::Lost;
                    }
                    None => {
                        info!("Board '{}' channel closed by server", self.params.board_id);
                        return SessionEnd::Lost;
                    }
                },
            }
        }
    }

    /// Apply one server frame. Malformed or unknown frames are dropped.
    fn handle_frame(&mut self, text: &str) {
        if !self.alive.is_alive() {
            return;
        }
        match ServerMessage::from_text(text) {
            Ok(Some(ServerMessage::BoardState { board })) => {
                self.store.set_board(board);
            }
            Ok(Some(ServerMessage::Authenticated {
                participant_id,
                is_facilitator,
            })) => {
                info!(
                    "✅ Authenticated on board '{}' as {}{}",
                    self.params.board_id,
                    participant_id,
                    if is_facilitator { " (facilitator)" } else { "" }
                );
                self.issued_id = Some(participant_id.clone());
                self.store.set_auth(participant_id, is_facilitator);
                self.set_phase(ConnectionPhase::Authenticated);
            }
            Ok(Some(ServerMessage::Error { message })) => {
                warn!("❌ Server rejected a request: {}", message);
                self.store.set_error(message);
            }
            Ok(None) => debug!("Ignoring unknown event: {}", text),
            Err(e) => warn!("⚠️  Dropping malformed frame: {}", e),
        }
    }

    fn set_phase(&self, phase: ConnectionPhase) {
        self.phase.send_if_modified(|current| {
            let changed = *current != phase;
            *current = phase;
            changed
        });
    }

    /// Run a store mutation only while the owning view is alive.
    fn guarded(&self, mutate: impl FnOnce(&BoardStore)) {
        if self.alive.is_alive() {
            mutate(&self.store);
        }
    }
}

async fn write(transport: &mut dyn Transport, message: &ClientMessage) -> Result<()> {
    let text = message.to_text()?;
    debug!("Sending {}", message.kind());
    transport.send(text).await
}

// ============================================================================
// CONNECTION MANAGER - At most one live connection per board view
// ============================================================================

/// Starts, replaces and tears down the board connection of one view.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    store: BoardStore,
    settings: SyncSettings,
    current: Option<ConnectionHandle>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, store: BoardStore, settings: SyncSettings) -> Self {
        Self {
            connector,
            store,
            settings,
            current: None,
        }
    }

    /// Connect to `params`, tearing down any previous connection first.
    ///
    /// Reconnecting with identical parameters keeps the existing connection.
    pub async fn connect(&mut self, params: JoinParams) {
        if let Some(current) = &self.current {
            if current.params() == &params {
                return;
            }
        }
        self.disconnect().await;
        info!("Starting connection for board '{}'", params.board_id);
        self.current = Some(ConnectionHandle::start(
            self.connector.clone(),
            self.store.clone(),
            params,
            &self.settings,
        ));
    }

    /// Tear down the current connection, if any. No reconnect follows.
    pub async fn disconnect(&mut self) {
        if let Some(handle) = self.current.take() {
            info!("Closing connection for board '{}'", handle.params().board_id);
            handle.shutdown().await;
        }
    }

    /// Fire-and-forget a command. `true` means queued for the open channel,
    /// not delivered; see [`ConnectionHandle::send`].
    pub fn send(&self, message: ClientMessage) -> bool {
        match &self.current {
            Some(handle) => handle.send(message),
            None => false,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.current
            .as_ref()
            .map(|h| h.phase())
            .unwrap_or(ConnectionPhase::Disconnected)
    }

    pub fn handle(&self) -> Option<&ConnectionHandle> {
        self.current.as_ref()
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }
}
