//! Core collaborators shared by the REST and WebSocket layers
//!
//! - IdSource: correlation ids for outbound frames
//! - AuthContext: login parameters for private sessions

pub mod auth;
pub mod request_id;

pub use auth::{AuthContext, HmacAuth};
pub use request_id::{AtomicIdSource, IdSource, NonceIdSource};
