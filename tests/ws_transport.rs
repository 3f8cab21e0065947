//! WebSocket board channel against a loopback tokio-tungstenite server.

mod common;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use common::*;
use retro_sync::client::manager::{ConnectionManager, JoinParams};
use retro_sync::client::store::BoardStore;
use retro_sync::common::config::SyncSettings;
use retro_sync::common::connection::{Connector, Transport, WsConnector};
use retro_sync::common::messages::{ClientMessage, ServerMessage};

/// Accept one connection, report its path and the first frame, then push
/// `replies` and close.
async fn serve_once(
    listener: TcpListener,
    replies: Vec<ServerMessage>,
) -> (String, ClientMessage) {
    let (stream, _) = listener.accept().await.unwrap();
    let (path_tx, path_rx) = oneshot::channel();
    let record_path = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let _ = path_tx.send(req.uri().path().to_string());
        Ok(resp)
    };
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, record_path)
        .await
        .unwrap();

    let first = loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => break text,
            _ => continue,
        }
    };
    for reply in replies {
        ws.send(Message::Text(reply.to_text().unwrap())).await.unwrap();
    }
    ws.close(None).await.unwrap();

    (path_rx.await.unwrap(), serde_json::from_str(&first).unwrap())
}

#[tokio::test]
async fn transport_round_trips_text_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let b = board(vec![column("c1", vec![])]);
    let server = tokio::spawn(serve_once(listener, vec![board_state(&b)]));

    let connector = WsConnector::new(format!("http://{}", addr));
    let mut transport = connector.connect("b1").await.unwrap();
    transport.send(ClientMessage::ToggleBlur.to_text().unwrap()).await.unwrap();

    let frame = transport.recv().await.unwrap().unwrap();
    assert_eq!(ServerMessage::from_text(&frame).unwrap(), Some(board_state(&b)));
    assert!(transport.recv().await.is_none(), "server close ends the stream");

    let (path, first) = server.await.unwrap();
    assert_eq!(path, "/ws/boards/b1");
    assert_eq!(first, ClientMessage::ToggleBlur);
}

#[tokio::test]
async fn manager_joins_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let b = board(vec![column("c1", vec![ticket("t1", "p1", "hello", 1, &[])])]);
    let server = tokio::spawn(serve_once(
        listener,
        vec![authenticated("p1", false), board_state(&b)],
    ));

    let store = BoardStore::new();
    let mut manager = ConnectionManager::new(
        std::sync::Arc::new(WsConnector::new(format!("http://{}", addr))),
        store.clone(),
        SyncSettings::default(),
    );
    manager
        .connect(JoinParams {
            board_id: "b1".into(),
            participant_name: "Alex".into(),
            facilitator_token: None,
        })
        .await;

    let state = wait_for(&store, |s| s.board.is_some() && s.identity.is_some()).await;
    assert_eq!(state.board.as_deref(), Some(&b));

    let (path, first) = server.await.unwrap();
    assert_eq!(path, "/ws/boards/b1");
    assert_eq!(
        first,
        ClientMessage::Join {
            participant_name: "Alex".into(),
            facilitator_token: None,
            participant_id: None,
        }
    );
    manager.disconnect().await;
}
