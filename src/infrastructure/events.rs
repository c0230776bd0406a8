//! Connector events
//!
//! Components report what happens to them through an injected
//! [`EventObserver`] instead of a logger singleton. [`TracingObserver`] turns
//! events into `tracing` records under the `rest`, `ws` and `listener` targets
//! that the file logging splits on.

use std::time::Duration;

/// Something worth reporting happened inside the connector
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    /// A failed REST attempt will be retried after `delay`
    RetryScheduled {
        url: String,
        status: Option<u16>,
        attempt: u32,
        delay: Duration,
        message: String,
        /// Routine noise (e.g. first `Forbidden`) that should not be surfaced
        suppressed: bool,
    },
    /// REST retries are exhausted
    RequestFailed {
        url: String,
        status: Option<u16>,
        attempts: u32,
    },
    /// Transport handle established
    Connected { url: String },
    ConnectFailed { url: String, error: String },
    LoginSent { id: u64 },
    LoginAcknowledged { id: u64 },
    /// No acknowledgment within the login timeout; the session proceeds anyway
    LoginUnconfirmed { id: u64 },
    FrameSent { id: u64, method: String },
    /// Inbound frame that is not a JSON document
    MalformedFrame { error: String },
    /// Idle ping went unanswered; the receive loop ends
    PingTimeout { url: String },
    /// Receive loop ended because the transport closed or failed
    StreamClosed { url: String, reason: String },
    /// Transport handle released
    Disconnected { url: String },
    /// One listener attempt ended with an error
    ListenerFailure { stream: String, error: String },
    /// Listener is about to wait before the next reconnect cycle
    ListenerRestarting { stream: String, cooldown: Duration },
}

/// Receives connector events
pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &ConnectorEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn on_event(&self, event: &ConnectorEvent) {
        match event {
            ConnectorEvent::RetryScheduled {
                url,
                status,
                attempt,
                delay,
                message,
                suppressed,
            } => {
                if *suppressed {
                    tracing::debug!(target: "rest", %url, ?status, attempt, "Retrying request");
                } else {
                    tracing::warn!(
                        target: "rest",
                        "Error fetching data from {}. HTTP status is {:?}. Retrying in {:.0}s. {}",
                        url,
                        status,
                        delay.as_secs_f64(),
                        message
                    );
                }
            }
            ConnectorEvent::RequestFailed { url, status, attempts } => {
                tracing::error!(target: "rest", %url, ?status, attempts, "Request failed, retries exhausted");
            }
            ConnectorEvent::Connected { url } => {
                tracing::info!(target: "ws", %url, "WebSocket connected");
            }
            ConnectorEvent::ConnectFailed { url, error } => {
                tracing::error!(target: "ws", %url, "Websocket error: '{}'", error);
            }
            ConnectorEvent::LoginSent { id } => {
                tracing::debug!(target: "ws", id, "Login sent");
            }
            ConnectorEvent::LoginAcknowledged { id } => {
                tracing::info!(target: "ws", id, "Login acknowledged");
            }
            ConnectorEvent::LoginUnconfirmed { id } => {
                tracing::warn!(target: "ws", id, "No login acknowledgment, continuing");
            }
            ConnectorEvent::FrameSent { id, method } => {
                tracing::trace!(target: "ws", id, %method, "Frame sent");
            }
            ConnectorEvent::MalformedFrame { error } => {
                tracing::warn!(target: "ws", "Dropping malformed frame: {}", error);
            }
            ConnectorEvent::PingTimeout { url } => {
                tracing::warn!(target: "ws", %url, "WebSocket ping timed out. Going to reconnect...");
            }
            ConnectorEvent::StreamClosed { url, reason } => {
                tracing::info!(target: "ws", %url, %reason, "WebSocket stream closed");
            }
            ConnectorEvent::Disconnected { url } => {
                tracing::debug!(target: "ws", %url, "WebSocket disconnected");
            }
            ConnectorEvent::ListenerFailure { stream, error } => {
                tracing::error!(target: "listener", %stream, "Unexpected error with WebSocket connection: {}", error);
            }
            ConnectorEvent::ListenerRestarting { stream, cooldown } => {
                tracing::warn!(
                    target: "listener",
                    %stream,
                    "WebSocket stream ended. Retrying after {:.0} seconds...",
                    cooldown.as_secs_f64()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_observer_handles_every_event() {
        // No subscriber installed: must not panic
        let observer = TracingObserver;
        let events = [
            ConnectorEvent::Connected { url: "ws://x".into() },
            ConnectorEvent::RetryScheduled {
                url: "http://x".into(),
                status: Some(403),
                attempt: 1,
                delay: Duration::from_secs(4),
                message: "Forbidden".into(),
                suppressed: true,
            },
            ConnectorEvent::ListenerRestarting {
                stream: "user".into(),
                cooldown: Duration::from_secs(30),
            },
        ];
        for event in &events {
            observer.on_event(event);
        }
    }
}
