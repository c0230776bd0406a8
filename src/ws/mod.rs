//! WebSocket side of the connector

pub mod connection;
pub mod frame;
pub mod listener;
pub mod session;

pub use connection::{ConnectionState, WebSocketConnection, WebSocketError};
pub use frame::OutboundFrame;
pub use listener::StreamListener;
pub use session::WsSession;
