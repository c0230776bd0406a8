//! WebSocket session: connect, login, emit, receive
//!
//! A session owns at most one transport handle. `connect()` releases any
//! previous handle first. Emits go through a shared writer so they can
//! interleave with the receive loop started by `on_message()`.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::Stream;
use serde_json::{Map, Value};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::core::auth::AuthContext;
use crate::core::request_id::{AtomicIdSource, IdSource};
use crate::infrastructure::config::WebSocketConfig;
use crate::infrastructure::events::{ConnectorEvent, EventObserver, TracingObserver};
use crate::ws::connection::{
    ConnectionReader, ConnectionState, ConnectionWriter, WebSocketConnection, WebSocketError,
};
use crate::ws::frame::{reply_id, subscribe_method, unsubscribe_method, OutboundFrame};
use crate::{Result, VenueError};

pub struct WsSession {
    config: WebSocketConfig,
    auth: Option<Arc<dyn AuthContext>>,
    ids: Arc<dyn IdSource>,
    observer: Arc<dyn EventObserver>,
    reader: Option<ConnectionReader>,
    writer: Option<ConnectionWriter>,
    /// Frames that arrived while waiting for the login acknowledgment
    pending: VecDeque<Value>,
    state: ConnectionState,
}

impl WsSession {
    /// Public session with its own id counter
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            auth: None,
            ids: Arc::new(AtomicIdSource::new()),
            observer: Arc::new(TracingObserver),
            reader: None,
            writer: None,
            pending: VecDeque::new(),
            state: ConnectionState::Disconnected,
        }
    }

    /// Credentials make the session private
    pub fn with_auth(mut self, auth: Arc<dyn AuthContext>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[inline]
    pub fn is_private(&self) -> bool {
        self.auth.is_some()
    }

    pub fn url(&self) -> &str {
        self.config.url(self.is_private())
    }

    pub fn state(&self) -> ConnectionState {
        match &self.writer {
            // The receive loop may have closed the shared handle
            Some(writer) if writer.is_closed() => ConnectionState::Disconnected,
            _ => self.state,
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open the transport and, for private sessions, log in
    pub async fn connect(&mut self) -> Result<()> {
        self.disconnect().await;

        let url = self.url().to_string();
        self.state = ConnectionState::Connecting;

        let connection = match WebSocketConnection::connect(&url, &self.config).await {
            Ok(connection) => connection,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                self.observer.on_event(&ConnectorEvent::ConnectFailed {
                    url,
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let (reader, writer) = connection.into_split();
        self.reader = Some(reader);
        self.writer = Some(writer);
        self.observer.on_event(&ConnectorEvent::Connected { url: url.clone() });

        if let Some(auth) = self.auth.clone() {
            self.state = ConnectionState::Authenticating;
            if let Err(e) = self.login(auth.as_ref()).await {
                self.observer.on_event(&ConnectorEvent::ConnectFailed {
                    url,
                    error: e.to_string(),
                });
                self.disconnect().await;
                return Err(e);
            }
        }

        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Release the transport handle; no-op when there is none
    pub async fn disconnect(&mut self) {
        self.reader = None;
        self.pending.clear();
        self.state = ConnectionState::Disconnected;
        if let Some(writer) = self.writer.take() {
            if writer.close().await {
                self.observer.on_event(&ConnectorEvent::Disconnected {
                    url: self.url().to_string(),
                });
            }
        }
    }

    /// Send `{id, method, params}` and return the id
    pub async fn emit(&self, method: &str, params: Value) -> Result<u64> {
        let id = self.ids.next_id();
        self.send_frame(&OutboundFrame::new(id, method, params)).await?;
        Ok(id)
    }

    /// `subscribe<Channel>` with `symbol = pair` added to `params`
    pub async fn subscribe(
        &self,
        channel: &str,
        pair: &str,
        params: Option<&Map<String, Value>>,
    ) -> Result<u64> {
        let params = with_symbol(params, pair);
        self.emit(&subscribe_method(channel), params).await
    }

    pub async fn unsubscribe(
        &self,
        channel: &str,
        pair: &str,
        params: Option<&Map<String, Value>>,
    ) -> Result<u64> {
        let params = with_symbol(params, pair);
        self.emit(&unsubscribe_method(channel), params).await
    }

    /// Subscribe to a channel that is not tied to a trading pair
    pub async fn subscribe_channel(
        &self,
        channel: &str,
        params: Option<&Map<String, Value>>,
    ) -> Result<u64> {
        let params = Value::Object(params.cloned().unwrap_or_default());
        self.emit(&subscribe_method(channel), params).await
    }

    /// Received JSON documents until the connection dies
    ///
    /// Idle for `message_timeout`: ping, then require any frame within
    /// `ping_timeout`. Every exit path closes the transport. The reader is
    /// moved into the stream, so a second call yields nothing until the next
    /// `connect()`.
    pub fn on_message(&mut self) -> impl Stream<Item = Value> + Send + 'static {
        let reader = self.reader.take();
        let writer = self.writer.clone();
        let pending = std::mem::take(&mut self.pending);
        let observer = self.observer.clone();
        let url = self.url().to_string();
        let message_timeout = self.config.message_timeout();
        let ping_timeout = self.config.ping_timeout();

        async_stream::stream! {
            for doc in pending {
                yield doc;
            }

            let (mut reader, writer) = match (reader, writer) {
                (Some(reader), Some(writer)) => (reader, writer),
                _ => {
                    observer.on_event(&ConnectorEvent::StreamClosed {
                        url: url.clone(),
                        reason: WebSocketError::StreamTaken.to_string(),
                    });
                    return;
                }
            };

            loop {
                let received = match timeout(message_timeout, reader.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        // A peer that stops reading stalls the ping itself
                        match timeout(ping_timeout, writer.ping()).await {
                            Ok(Ok(())) => {}
                            Ok(Err(WebSocketError::Timeout)) | Err(_) => {
                                observer.on_event(&ConnectorEvent::PingTimeout { url: url.clone() });
                                break;
                            }
                            Ok(Err(e)) => {
                                observer.on_event(&ConnectorEvent::StreamClosed {
                                    url: url.clone(),
                                    reason: e.to_string(),
                                });
                                break;
                            }
                        }
                        match timeout(ping_timeout, reader.recv()).await {
                            Ok(received) => received,
                            Err(_) => {
                                observer.on_event(&ConnectorEvent::PingTimeout { url: url.clone() });
                                break;
                            }
                        }
                    }
                };

                match received {
                    Ok(Some(Message::Text(text))) => match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(doc) => {
                            yield doc;
                        }
                        Err(e) => observer.on_event(&ConnectorEvent::MalformedFrame { error: e.to_string() }),
                    },
                    Ok(Some(Message::Binary(data))) => match serde_json::from_slice::<Value>(&data) {
                        Ok(doc) => {
                            yield doc;
                        }
                        Err(e) => observer.on_event(&ConnectorEvent::MalformedFrame { error: e.to_string() }),
                    },
                    Ok(Some(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_string())
                            .unwrap_or_else(|| "close frame".to_string());
                        observer.on_event(&ConnectorEvent::StreamClosed { url: url.clone(), reason });
                        break;
                    }
                    // Ping, pong and raw frames only count as liveness
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        observer.on_event(&ConnectorEvent::StreamClosed {
                            url: url.clone(),
                            reason: WebSocketError::ConnectionClosed.to_string(),
                        });
                        break;
                    }
                    Err(e) => {
                        observer.on_event(&ConnectorEvent::StreamClosed { url: url.clone(), reason: e.to_string() });
                        break;
                    }
                }
            }

            if writer.close().await {
                observer.on_event(&ConnectorEvent::Disconnected { url });
            }
        }
    }

    async fn send_frame(&self, frame: &OutboundFrame) -> Result<()> {
        let writer = self.writer.as_ref().ok_or(WebSocketError::NotConnected)?;
        let text = frame
            .to_text()
            .map_err(|e| WebSocketError::SendFailed(e.to_string()))?;
        writer.send_text(text).await?;
        self.observer.on_event(&ConnectorEvent::FrameSent {
            id: frame.id,
            method: frame.method.clone(),
        });
        Ok(())
    }

    async fn login(&mut self, auth: &dyn AuthContext) -> Result<()> {
        let id = self.ids.next_id();
        let frame = OutboundFrame::new(id, "login", auth.login_params(id));
        self.send_frame(&frame).await?;
        self.observer.on_event(&ConnectorEvent::LoginSent { id });
        self.await_login_ack(id).await
    }

    /// Wait for the reply carrying `id`, buffering anything else
    async fn await_login_ack(&mut self, id: u64) -> Result<()> {
        let deadline = Instant::now() + self.config.login_timeout();
        let reader = self.reader.as_mut().ok_or(WebSocketError::NotConnected)?;

        loop {
            let received = match timeout_at(deadline, reader.recv()).await {
                Ok(received) => received?,
                Err(_) => {
                    self.observer.on_event(&ConnectorEvent::LoginUnconfirmed { id });
                    return Ok(());
                }
            };

            let decoded = match received {
                Some(Message::Text(text)) => serde_json::from_str::<Value>(text.as_str()),
                Some(Message::Binary(data)) => serde_json::from_slice::<Value>(&data),
                Some(Message::Close(_)) | None => return Err(WebSocketError::ConnectionClosed.into()),
                Some(_) => continue,
            };
            let doc = match decoded {
                Ok(doc) => doc,
                Err(e) => {
                    self.observer.on_event(&ConnectorEvent::MalformedFrame { error: e.to_string() });
                    continue;
                }
            };

            if reply_id(&doc) != Some(id) {
                self.pending.push_back(doc);
                continue;
            }
            if doc.get("error").is_some() {
                return Err(VenueError::LoginRejected(doc));
            }
            self.observer.on_event(&ConnectorEvent::LoginAcknowledged { id });
            return Ok(());
        }
    }
}

/// Per-call params with the trading pair injected
fn with_symbol(params: Option<&Map<String, Value>>, pair: &str) -> Value {
    let mut params = params.cloned().unwrap_or_default();
    params.insert("symbol".to_string(), Value::String(pair.to_string()));
    Value::Object(params)
}
