//! Connection manager scenarios against an in-memory board server.
//!
//! Time is paused: the 2000 ms reconnect delay elapses instantly and
//! deterministically.

mod common;

use std::time::Duration;

use tokio::time::{sleep, Instant};

use common::*;
use retro_sync::client::manager::{ConnectionManager, ConnectionPhase, JoinParams};
use retro_sync::client::store::BoardStore;
use retro_sync::common::config::SyncSettings;
use retro_sync::common::messages::{ClientMessage, ServerMessage};

fn params(board_id: &str, name: &str) -> JoinParams {
    JoinParams {
        board_id: board_id.into(),
        participant_name: name.into(),
        facilitator_token: None,
    }
}

fn join(name: &str, participant_id: Option<&str>) -> ClientMessage {
    ClientMessage::Join {
        participant_name: name.into(),
        facilitator_token: None,
        participant_id: participant_id.map(str::to_string),
    }
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_drop_and_replaces_snapshot() {
    let (connector, mut accepted) = MockConnector::new();
    let store = BoardStore::new();
    let mut manager = ConnectionManager::new(connector.clone(), store.clone(), SyncSettings::default());
    manager.connect(params("b1", "Alex")).await;

    let mut server = next_connection(&mut accepted).await;
    assert_eq!(server.board_id, "b1");
    assert_eq!(server.expect_sent().await, join("Alex", None));

    server.push(&authenticated("p1", false));
    let before = board(vec![column("c1", vec![ticket("t1", "p1", "old news", 1, &[])])]);
    server.push(&board_state(&before));
    wait_for(&store, |s| s.board.is_some() && s.identity.is_some()).await;
    assert_eq!(manager.phase(), ConnectionPhase::Authenticated);

    // Connection drops mid-session
    let dropped_at = Instant::now();
    drop(server);
    let state = wait_for(&store, |s| !s.connected).await;
    assert!(state.board.is_some(), "last snapshot stays visible while reconnecting");

    let mut server = next_connection(&mut accepted).await;
    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 2);
    let waited = attempts[1] - dropped_at;
    assert!(waited >= Duration::from_millis(2000), "retried after {:?}", waited);
    assert!(waited < Duration::from_millis(2100), "retried after {:?}", waited);

    // Join is re-sent, carrying the identity issued the first time
    assert_eq!(server.expect_sent().await, join("Alex", Some("p1")));
    assert!(store.is_connected());

    let after = board(vec![column("c1", vec![ticket("t2", "p2", "fresh", 5, &[])])]);
    server.push(&board_state(&after));
    let state = wait_for(&store, |s| s.board.as_deref() == Some(&after)).await;
    assert!(state.board.unwrap().ticket("t1").is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_attempts_retry_at_fixed_delay() {
    let (connector, mut accepted) = MockConnector::new();
    connector.fail_next(2);
    let store = BoardStore::new();
    let mut manager = ConnectionManager::new(connector.clone(), store.clone(), SyncSettings::default());
    manager.connect(params("b1", "Alex")).await;

    let mut server = next_connection(&mut accepted).await;
    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[1] - attempts[0], Duration::from_millis(2000));
    assert_eq!(attempts[2] - attempts[1], Duration::from_millis(2000));
    assert_eq!(server.expect_sent().await, join("Alex", None));
}

#[tokio::test(start_paused = true)]
async fn commands_are_dropped_while_not_open() {
    let (connector, mut accepted) = MockConnector::new();
    connector.fail_next(1);
    let store = BoardStore::new();
    let mut manager = ConnectionManager::new(connector.clone(), store.clone(), SyncSettings::default());

    // No connection at all yet
    assert!(!manager.send(ClientMessage::ToggleBlur));

    manager.connect(params("b1", "Alex")).await;
    assert!(!manager.send(ClientMessage::AddTicket {
        column_id: "c1".into(),
        content: "lost".into(),
    }));

    let mut server = next_connection(&mut accepted).await;
    assert_eq!(server.expect_sent().await, join("Alex", None));

    assert!(manager.send(ClientMessage::StopTimer));
    assert_eq!(server.expect_sent().await, ClientMessage::StopTimer);
    assert!(server.drain_sent().is_empty(), "dropped commands are never replayed");
}

#[tokio::test(start_paused = true)]
async fn queued_command_does_not_outlive_its_channel() {
    let (connector, mut accepted) = MockConnector::new();
    let store = BoardStore::new();
    let mut manager = ConnectionManager::new(connector, store.clone(), SyncSettings::default());
    manager.connect(params("b1", "Alex")).await;

    let mut server = next_connection(&mut accepted).await;
    assert_eq!(server.expect_sent().await, join("Alex", None));
    wait_for(&store, |s| s.connected).await;

    // Queued while the channel still reads as open, then the channel dies
    server.fail("connection reset");
    assert!(manager.send(ClientMessage::ToggleBlur), "queued for the open channel");
    wait_for(&store, |s| !s.connected).await;

    let mut server = next_connection(&mut accepted).await;
    assert_eq!(server.expect_sent().await, join("Alex", None));
    sleep(Duration::from_millis(100)).await;
    assert!(server.drain_sent().is_empty(), "queued command is not replayed");
}

#[tokio::test(start_paused = true)]
async fn authenticated_may_arrive_after_first_snapshot() {
    let (connector, mut accepted) = MockConnector::new();
    let store = BoardStore::new();
    let mut manager = ConnectionManager::new(connector, store.clone(), SyncSettings::default());
    manager.connect(params("b1", "Alex")).await;

    let mut server = next_connection(&mut accepted).await;
    server.expect_sent().await;

    let b = board(vec![column("c1", vec![])]);
    server.push(&board_state(&b));
    let state = wait_for(&store, |s| s.board.is_some()).await;
    assert!(state.identity.is_none());
    assert!(state.view().is_some(), "renders before identity is known");
    assert_eq!(manager.phase(), ConnectionPhase::Open);

    server.push(&authenticated("p7", true));
    let state = wait_for(&store, |s| s.identity.is_some()).await;
    let identity = state.identity.unwrap();
    assert_eq!(identity.participant_id, "p7");
    assert!(identity.is_facilitator);
    assert_eq!(state.board.as_deref(), Some(&b));
}

#[tokio::test(start_paused = true)]
async fn error_and_unknown_events_leave_state_alone() {
    let (connector, mut accepted) = MockConnector::new();
    let store = BoardStore::new();
    let mut manager = ConnectionManager::new(connector.clone(), store.clone(), SyncSettings::default());
    manager.connect(params("b1", "Alex")).await;

    let mut server = next_connection(&mut accepted).await;
    server.expect_sent().await;
    server.push(&authenticated("p1", false));
    let b = board(vec![column("c1", vec![ticket("t1", "p1", "keep me", 1, &[])])]);
    server.push(&board_state(&b));
    wait_for(&store, |s| s.board.is_some() && s.identity.is_some()).await;

    server.push_raw(r#"{"type":"ParticipantJoined","payload":{"name":"Sam"}}"#);
    server.push_raw("this is not json");
    server.push(&ServerMessage::Error {
        message: "Only the facilitator can do that".into(),
    });

    let state = wait_for(&store, |s| s.last_error.is_some()).await;
    assert_eq!(state.last_error.as_deref(), Some("Only the facilitator can do that"));
    assert_eq!(state.board.as_deref(), Some(&b));
    assert!(state.connected);
    assert_eq!(manager.phase(), ConnectionPhase::Authenticated);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.attempts().len(), 1, "errors never trigger a reconnect");
}

#[tokio::test(start_paused = true)]
async fn transport_error_schedules_reconnect() {
    let (connector, mut accepted) = MockConnector::new();
    let store = BoardStore::new();
    let mut manager = ConnectionManager::new(connector.clone(), store.clone(), SyncSettings::default());
    manager.connect(params("b1", "Alex")).await;

    let mut server = next_connection(&mut accepted).await;
    server.expect_sent().await;
    wait_for(&store, |s| s.connected).await;

    server.fail("connection reset");
    wait_for(&store, |s| !s.connected).await;
    assert_eq!(manager.phase(), ConnectionPhase::Disconnected);

    let mut server = next_connection(&mut accepted).await;
    assert_eq!(server.expect_sent().await, join("Alex", None));
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_everything() {
    let (connector, mut accepted) = MockConnector::new();
    let store = BoardStore::new();
    let mut manager = ConnectionManager::new(connector.clone(), store.clone(), SyncSettings::default());
    manager.connect(params("b1", "Alex")).await;

    let mut server = next_connection(&mut accepted).await;
    server.expect_sent().await;
    let b = board(vec![column("c1", vec![])]);
    server.push(&board_state(&b));
    wait_for(&store, |s| s.board.is_some()).await;

    manager.disconnect().await;
    assert!(server.client_closed());
    assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
    assert!(!manager.send(ClientMessage::ToggleBlur));

    // Late frames and the retry delay have no effect
    let mut late = b.clone();
    late.title = "late".into();
    server.push(&board_state(&late));
    drop(server);
    sleep(Duration::from_secs(10)).await;

    assert_eq!(connector.attempts().len(), 1);
    assert!(accepted.try_recv().is_err());
    assert_eq!(store.board().unwrap().title, "Sprint 42");
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_pending_retry() {
    let (connector, _accepted) = MockConnector::new();
    connector.fail_next(1);
    let store = BoardStore::new();
    let mut manager = ConnectionManager::new(connector.clone(), store.clone(), SyncSettings::default());
    manager.connect(params("b1", "Alex")).await;

    sleep(Duration::from_millis(500)).await;
    assert_eq!(connector.attempts().len(), 1);

    manager.disconnect().await;
    sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.attempts().len(), 1, "no reconnect after teardown");
}

#[tokio::test(start_paused = true)]
async fn switching_boards_replaces_the_connection() {
    let (connector, mut accepted) = MockConnector::new();
    let store = BoardStore::new();
    let mut manager = ConnectionManager::new(connector.clone(), store.clone(), SyncSettings::default());

    manager.connect(params("b1", "Alex")).await;
    let mut first = next_connection(&mut accepted).await;
    first.expect_sent().await;

    // Same parameters: nothing happens
    manager.connect(params("b1", "Alex")).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.attempts().len(), 1);

    manager.connect(params("b2", "Alex")).await;
    assert!(first.client_closed());
    let second = next_connection(&mut accepted).await;
    assert_eq!(second.board_id, "b2");
}
