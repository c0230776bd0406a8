//! WebSocket transport handle
//!
//! Thin wrapper over tokio-tungstenite, split into a reader owned by the
//! receive loop and a clonable writer shared by emitters. Closing is
//! idempotent across all writer clones.
//!
//! Every write is bounded by the send timeout, including the wait for the
//! writer lock, so a peer that stops reading cannot wedge other writers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

use crate::infrastructure::config::WebSocketConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Login frame sent, waiting for the acknowledgment
    Authenticating,
    Connected,
}

/// Errors that can occur with WebSocket connections
#[derive(Debug, thiserror::Error)]
pub enum WebSocketError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Timeout")]
    Timeout,
    #[error("Not connected")]
    NotConnected,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message stream already taken")]
    StreamTaken,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Freshly opened connection, not yet split
pub struct WebSocketConnection {
    stream: WsStream,
    url: String,
    send_timeout: Duration,
    close_timeout: Duration,
}

impl WebSocketConnection {
    /// Open `url` (ws:// or wss://) within the configured connect timeout
    pub async fn connect(url: &str, config: &WebSocketConfig) -> Result<Self> {
        let (stream, _) = timeout(config.connect_timeout(), connect_async(url))
            .await
            .map_err(|_| WebSocketError::Timeout)?
            .map_err(|e| WebSocketError::ConnectionFailed(e.to_string()))?;

        if let MaybeTlsStream::Plain(tcp) = stream.get_ref() {
            tcp.set_nodelay(true)
                .map_err(|e| WebSocketError::ConnectionFailed(e.to_string()))?;
        }

        Ok(Self {
            stream,
            url: url.to_string(),
            send_timeout: config.send_timeout(),
            close_timeout: config.close_timeout(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Reader for the receive loop, writer for everyone else
    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter) {
        let (sink, stream) = self.stream.split();
        (
            ConnectionReader { stream },
            ConnectionWriter {
                sink: Arc::new(Mutex::new(sink)),
                closed: Arc::new(AtomicBool::new(false)),
                send_timeout: self.send_timeout,
                close_timeout: self.close_timeout,
            },
        )
    }
}

/// Inbound half
pub struct ConnectionReader {
    stream: SplitStream<WsStream>,
}

impl ConnectionReader {
    /// Next frame; `None` once the peer has gone away
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        match self.stream.next().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(WebSocketError::ReceiveFailed(e.to_string())),
            None => Ok(None),
        }
    }
}

/// Outbound half; clones share the sink and the closed flag
#[derive(Clone)]
pub struct ConnectionWriter {
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    closed: Arc<AtomicBool>,
    send_timeout: Duration,
    close_timeout: Duration,
}

impl ConnectionWriter {
    async fn send(&self, msg: Message) -> Result<()> {
        if self.is_closed() {
            return Err(WebSocketError::NotConnected);
        }
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(msg).await
        };
        match timeout(self.send_timeout, write).await {
            Ok(sent) => sent.map_err(|e| WebSocketError::SendFailed(e.to_string())),
            Err(_) => Err(WebSocketError::Timeout),
        }
    }

    #[inline]
    pub async fn send_text(&self, text: String) -> Result<()> {
        self.send(Message::text(text)).await
    }

    #[inline]
    pub async fn ping(&self) -> Result<()> {
        self.send(Message::Ping(Bytes::new())).await
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the connection; only the first call across all clones does
    /// anything and returns `true`
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Peer may already be gone or stalled; the handle is released either way
        let shutdown = async {
            let mut sink = self.sink.lock().await;
            let _ = sink.close().await;
        };
        let _ = timeout(self.close_timeout, shutdown).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{spawn_ws_server, test_ws_config};

    #[test]
    fn test_websocket_error_display() {
        assert_eq!(WebSocketError::NotConnected.to_string(), "Not connected");
        assert_eq!(WebSocketError::Timeout.to_string(), "Timeout");
    }

    #[tokio::test]
    async fn test_close_is_idempotent_across_clones() {
        let url = spawn_ws_server(|_, mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let conn = WebSocketConnection::connect(&url, &test_ws_config(&url))
            .await
            .unwrap();
        let (_reader, writer) = conn.into_split();
        let other = writer.clone();

        writer.send_text("{}".to_string()).await.unwrap();
        assert!(writer.close().await);
        assert!(!other.close().await);
        assert!(other.is_closed());
        assert!(matches!(
            other.send_text("{}".to_string()).await,
            Err(WebSocketError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("ws://{}", addr);
        let result = WebSocketConnection::connect(&url, &test_ws_config(&url)).await;
        assert!(matches!(result, Err(WebSocketError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_reader_sees_server_frames() {
        let url = spawn_ws_server(|_, mut ws| async move {
            use futures_util::SinkExt;
            ws.send(Message::text(r#"{"a":1}"#)).await.ok();
            ws.close(None).await.ok();
        })
        .await;

        let conn = WebSocketConnection::connect(&url, &test_ws_config(&url))
            .await
            .unwrap();
        assert_eq!(conn.url(), url);
        let (mut reader, _writer) = conn.into_split();

        match reader.recv().await.unwrap() {
            Some(Message::Text(text)) => assert_eq!(text.as_str(), r#"{"a":1}"#),
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
