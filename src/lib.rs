//! Resilient connectivity layer for trading-venue APIs
//!
//! Two transports behind one crate:
//! - **rest**: throttled REST executor with response classification and retries
//! - **ws**: WebSocket session (connect, login, subscribe, receive with idle ping)
//!   and a stream listener that survives disconnects
//! - **core**: correlation id sources and authentication contexts
//! - **infrastructure**: config, logging, health and connector events

pub mod core;
pub mod infrastructure;
pub mod rest;
pub mod ws;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use infrastructure::config::{Config, ListenerConfig, RestConfig, ThrottleConfig, WebSocketConfig};
pub use rest::{ApiError, RestExecutor};
pub use ws::{StreamListener, WsSession};

use thiserror::Error;

/// Main error type for the connector
#[derive(Error, Debug)]
pub enum VenueError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] ws::WebSocketError),

    #[error("REST API error: {0}")]
    Api(#[from] ApiError),

    #[error("Login rejected: {0}")]
    LoginRejected(serde_json::Value),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output queue closed")]
    QueueClosed,

    #[error("Cancelled")]
    Cancelled,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, VenueError>;
