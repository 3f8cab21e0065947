//! # Board Channel Transport
//!
//! Provides the bidirectional text channel a board client talks over.
//!
//! ## Wire Protocol
//!
//! One WebSocket per board at `{ws|wss}://host/ws/boards/{board_id}`.
//! Every frame is a single newline-free JSON text message:
//! ```text
//! {"type": "<Tag>", "payload": { ...fields }}
//! ```
//!
//! The [`Transport`] and [`Connector`] traits keep the connection manager
//! independent of the socket implementation, so reconnect behaviour can be
//! driven by an in-memory transport.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::error::{Result, SyncError};

/// An open, exclusively owned board channel.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Receive the next text frame.
    ///
    /// # Returns
    /// - `Some(Ok(text))`: A frame arrived
    /// - `Some(Err(e))`: The channel failed
    /// - `None`: The peer closed the channel
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the channel. Errors are only informative.
    async fn close(&mut self) -> Result<()>;
}

/// Opens a fresh [`Transport`] for a board. Called once per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, board_id: &str) -> Result<Box<dyn Transport>>;
}

// ============================================================================
// WEBSOCKET IMPLEMENTATION
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket wrapper speaking text frames.
pub struct WsTransport {
    stream: WsStream,
}

impl WsTransport {
    pub fn new(stream: WsStream) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text)),
                Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!("⚠️  Dropping non UTF-8 binary frame"),
                },
                Ok(WsMessage::Close(frame)) => {
                    debug!("Server closed board channel: {:?}", frame);
                    return None;
                }
                // ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

/// Connects to `/ws/boards/{board_id}` below a configured server URL.
#[derive(Debug, Clone)]
pub struct WsConnector {
    server_url: String,
}

impl WsConnector {
    /// # Arguments
    /// - `server_url`: HTTP(S) or WS(S) base URL, e.g. `http://localhost:3000`
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, board_id: &str) -> Result<Box<dyn Transport>> {
        let url = board_socket_url(&self.server_url, board_id)?;
        debug!("Opening board channel at {}", url);
        let (stream, _response) = connect_async(url.as_str()).await?;
        Ok(Box::new(WsTransport::new(stream)))
    }
}

/// Build the WebSocket URL of a board from the server base URL.
///
/// `http` maps to `ws` and `https` to `wss`; an existing base path is kept.
///
/// # Example
/// ```ignore
/// let url = board_socket_url("https://retro.example.com", "abc123")?;
/// assert_eq!(url.as_str(), "wss://retro.example.com/ws/boards/abc123");
/// ```
pub fn board_socket_url(server_url: &str, board_id: &str) -> Result<Url> {
    let mut url = Url::parse(server_url)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(SyncError::Url(format!("unsupported scheme '{}'", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| SyncError::Url(format!("cannot use scheme '{}'", scheme)))?;
    url.path_segments_mut()
        .map_err(|_| SyncError::Url(format!("'{}' cannot be a base URL", server_url)))?
        .pop_if_empty()
        .extend(["ws", "boards", board_id]);
    url.set_query(None);
    Ok(url)
}
