//! Infrastructure - cold path only
//!
//! This module contains the ambient pieces around the connector:
//! - Configuration management
//! - Logging and connector events
//! - Stream health tracking

pub mod config;
pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{ConnectorEvent, EventObserver, TracingObserver};
pub use metrics::{HealthSnapshot, StreamHealth};
