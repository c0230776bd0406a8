//! Local WebSocket server for session and listener tests

use std::future::Future;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message, WebSocketStream};

use crate::infrastructure::config::WebSocketConfig;
use crate::infrastructure::events::{ConnectorEvent, EventObserver};

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Accept connections on an ephemeral port, running `handler` for each with
/// its 0-based connection index. Returns the `ws://` URL.
pub async fn spawn_ws_server<F, Fut>(handler: F) -> String
where
    F: Fn(usize, ServerSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        let mut index = 0;
        while let Ok((tcp, _)) = listener.accept().await {
            let handler = handler.clone();
            let conn = index;
            index += 1;
            tokio::spawn(async move {
                if let Ok(ws) = accept_async(tcp).await {
                    handler(conn, ws).await;
                }
            });
        }
    });

    format!("ws://{}", addr)
}

/// URL nothing listens on
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}

/// Same URL for public and private sessions, sub-second timeouts
pub fn test_ws_config(url: &str) -> WebSocketConfig {
    WebSocketConfig {
        public_url: url.to_string(),
        private_url: url.to_string(),
        connect_timeout_secs: 2.0,
        message_timeout_secs: 0.2,
        ping_timeout_secs: 0.2,
        login_timeout_secs: 0.5,
        send_timeout_secs: 0.5,
        close_timeout_secs: 0.5,
    }
}

/// Next JSON text frame from the client, answering pings on the way
pub async fn next_json(ws: &mut ServerSocket) -> Option<Value> {
    while let Some(Ok(msg)) = ws.next().await {
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
            Message::Ping(payload) => {
                ws.send(Message::Pong(payload)).await.ok()?;
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

pub async fn send_json(ws: &mut ServerSocket, doc: &Value) {
    ws.send(Message::text(doc.to_string())).await.ok();
}

/// Keeps every event for later assertions
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ConnectorEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ConnectorEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&ConnectorEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl EventObserver for RecordingObserver {
    fn on_event(&self, event: &ConnectorEvent) {
        self.events.lock().push(event.clone());
    }
}
