//! Stream listener: keeps one logical stream alive across reconnects
//!
//! Each cycle builds a fresh session, subscribes, drains messages into the
//! output queue, then cools down twice (a short pause for the dead
//! connection, a longer one before the next full cycle). Only cancellation
//! and a dropped consumer end the loop.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::auth::AuthContext;
use crate::core::request_id::{AtomicIdSource, IdSource};
use crate::infrastructure::config::{Config, ListenerConfig, SubscriptionConfig, WebSocketConfig};
use crate::infrastructure::events::{ConnectorEvent, EventObserver, TracingObserver};
use crate::infrastructure::metrics::StreamHealth;
use crate::ws::session::WsSession;
use crate::{Result, VenueError};

pub struct StreamListener {
    name: String,
    websocket: WebSocketConfig,
    config: ListenerConfig,
    auth: Option<Arc<dyn AuthContext>>,
    ids: Arc<dyn IdSource>,
    observer: Arc<dyn EventObserver>,
    health: Arc<StreamHealth>,
}

impl StreamListener {
    pub fn new(name: impl Into<String>, websocket: WebSocketConfig, config: ListenerConfig) -> Self {
        Self {
            name: name.into(),
            websocket,
            config,
            auth: None,
            ids: Arc::new(AtomicIdSource::new()),
            observer: Arc::new(TracingObserver),
            health: Arc::new(StreamHealth::new()),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &Config) -> Self {
        Self::new(name, config.websocket.clone(), config.listener.clone())
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthContext>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Shared by every session this listener builds
    pub fn with_ids(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_subscription(mut self, subscription: SubscriptionConfig) -> Self {
        self.config.subscriptions.push(subscription);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read-only view of the loop state
    pub fn health(&self) -> Arc<StreamHealth> {
        self.health.clone()
    }

    /// Run until cancelled or until the consumer drops its receiver
    pub async fn run(&self, output: UnboundedSender<Value>, cancel: CancellationToken) -> Result<()> {
        self.health.set_running(true);
        let result = self.cycle_forever(&output, &cancel).await;
        self.health.set_connected(false);
        self.health.set_running(false);
        result
    }

    async fn cycle_forever(
        &self,
        output: &UnboundedSender<Value>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            match self.run_session(output, cancel).await {
                Ok(()) => {}
                Err(e @ (VenueError::Cancelled | VenueError::QueueClosed)) => return Err(e),
                Err(e) => self.observer.on_event(&ConnectorEvent::ListenerFailure {
                    stream: self.name.clone(),
                    error: e.to_string(),
                }),
            }

            pause(self.config.inner_cooldown(), cancel).await?;

            let cooldown = self.config.outer_cooldown();
            self.observer.on_event(&ConnectorEvent::ListenerRestarting {
                stream: self.name.clone(),
                cooldown,
            });
            pause(cooldown, cancel).await?;
            self.health.record_reconnect();
        }
    }

    /// One session from connect to the end of its message stream
    async fn run_session(
        &self,
        output: &UnboundedSender<Value>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut session = self.session();
        let result = self.drain(&mut session, output, cancel).await;
        session.disconnect().await;
        self.health.set_connected(false);
        result
    }

    async fn drain(
        &self,
        session: &mut WsSession,
        output: &UnboundedSender<Value>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(VenueError::Cancelled),
            connected = session.connect() => connected?,
        }
        self.health.set_connected(true);

        let subscribed = async {
            for sub in &self.config.subscriptions {
                let params = (!sub.params.is_empty()).then_some(&sub.params);
                match &sub.symbol {
                    Some(symbol) => session.subscribe(&sub.channel, symbol, params).await?,
                    None => session.subscribe_channel(&sub.channel, params).await?,
                };
            }
            Ok::<(), VenueError>(())
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(VenueError::Cancelled),
            subscribed = subscribed => subscribed?,
        }

        let messages = session.on_message();
        futures_util::pin_mut!(messages);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(VenueError::Cancelled),
                next = messages.next() => next,
            };
            match next {
                Some(doc) => {
                    output.send(doc).map_err(|_| VenueError::QueueClosed)?;
                    self.health.record_message();
                }
                None => return Ok(()),
            }
        }
    }

    fn session(&self) -> WsSession {
        let session = WsSession::new(self.websocket.clone())
            .with_ids(self.ids.clone())
            .with_observer(self.observer.clone());
        match &self.auth {
            Some(auth) => session.with_auth(auth.clone()),
            None => session,
        }
    }
}

/// Sleep unless cancelled first
async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VenueError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
