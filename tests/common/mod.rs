//! Shared fixtures for the integration tests: an in-memory board server
//! reachable through the `Connector`/`Transport` seams, and board builders.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use retro_sync::client::store::{BoardStore, StoreState};
use retro_sync::common::connection::{Connector, Transport};
use retro_sync::common::error::{Result, SyncError};
use retro_sync::common::messages::{Board, ClientMessage, Column, ServerMessage, Ticket};

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

type Frame = std::result::Result<String, String>;

struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.outgoing
            .send(text)
            .map_err(|_| SyncError::Transport("server end dropped".into()))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        // A dropped server end reads as a close
        self.incoming
            .recv()
            .await
            .map(|frame| frame.map_err(SyncError::Transport))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// The server side of one accepted connection.
pub struct ServerEnd {
    pub board_id: String,
    to_client: mpsc::UnboundedSender<Frame>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl ServerEnd {
    pub fn push(&self, message: &ServerMessage) {
        let text = message.to_text().unwrap();
        self.push_raw(&text);
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.to_client.send(Ok(text.to_string()));
    }

    /// Make the client's next `recv` fail.
    pub fn fail(&self, reason: &str) {
        let _ = self.to_client.send(Err(reason.to_string()));
    }

    /// Next command the client sent.
    pub async fn expect_sent(&mut self) -> ClientMessage {
        let text = timeout(Duration::from_secs(30), self.from_client.recv())
            .await
            .expect("client sent nothing")
            .expect("client side gone");
        serde_json::from_str(&text).unwrap()
    }

    /// Whatever the client has sent so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<ClientMessage> {
        let mut sent = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            sent.push(serde_json::from_str(&text).unwrap());
        }
        sent
    }

    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Hands out a fresh [`MockTransport`] per connect and reports the server end.
pub struct MockConnector {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    failures: AtomicUsize,
    attempts: Mutex<Vec<Instant>>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted,
            failures: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
        });
        (connector, rx)
    }

    /// Refuse the next `n` connection attempts.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::Release);
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, board_id: &str) -> Result<Box<dyn Transport>> {
        self.attempts.lock().unwrap().push(Instant::now());
        let refused = self
            .failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(SyncError::Transport("connection refused".into()));
        }

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let _ = self.accepted.send(ServerEnd {
            board_id: board_id.to_string(),
            to_client,
            from_client,
            closed: closed.clone(),
        });
        Ok(Box::new(MockTransport {
            incoming,
            outgoing,
            closed,
        }))
    }
}

pub async fn next_connection(rx: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("no connection attempt")
        .expect("connector dropped")
}

/// Wait until the store satisfies `pred` and return that state.
pub async fn wait_for(store: &BoardStore, pred: impl FnMut(&StoreState) -> bool) -> StoreState {
    let mut rx = store.subscribe();
    let reached = timeout(Duration::from_secs(60), rx.wait_for(pred))
        .await
        .expect("store never reached the expected state");
    let state = reached.expect("store dropped").clone();
    state
}

// ============================================================================
// BOARD BUILDERS
// ============================================================================

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub fn ticket(id: &str, author: &str, content: &str, created_secs: i64, voters: &[&str]) -> Ticket {
    Ticket {
        id: id.into(),
        content: content.into(),
        author_id: author.into(),
        author_name: format!("name-{}", author),
        votes: voters.iter().map(|v| v.to_string()).collect(),
        created_at: at(created_secs),
    }
}

pub fn column(id: &str, tickets: Vec<Ticket>) -> Column {
    Column {
        id: id.into(),
        name: format!("Column {}", id),
        tickets,
    }
}

pub fn board(columns: Vec<Column>) -> Board {
    Board {
        id: "b1".into(),
        title: "Sprint 42".into(),
        columns,
        is_blurred: false,
        is_anonymous: false,
        hide_votes: false,
        vote_limit_per_column: None,
        timer_end: None,
        participant_count: 2,
        created_at: at(0),
    }
}

pub fn board_state(board: &Board) -> ServerMessage {
    ServerMessage::BoardState {
        board: board.clone(),
    }
}

pub fn authenticated(participant_id: &str, is_facilitator: bool) -> ServerMessage {
    ServerMessage::Authenticated {
        participant_id: participant_id.into(),
        is_facilitator,
    }
}
