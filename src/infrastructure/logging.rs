//! Centralized file-based logging system
//!
//! Writes logs to files under a log directory, separated by log type:
//! - main/    - every record, JSON
//! - error/   - warnings and errors only
//! - ws/      - WebSocket session logs (`ws` target)
//! - rest/    - REST executor logs (`rest` target)
//! - listener/ - stream listener logs (`listener` target)

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_TYPES: [&str; 5] = ["main", "error", "ws", "rest", "listener"];

/// Initialize file and console logging
///
/// Creates one subdirectory per log type under `logs_dir`. `RUST_LOG`
/// overrides the default `info` filter. The returned guards must be kept
/// alive for the duration of the program or buffered records are lost.
pub fn init_logging(logs_dir: &Path) -> io::Result<Vec<WorkerGuard>> {
    for log_type in LOG_TYPES {
        fs::create_dir_all(logs_dir.join(log_type))?;
    }

    let mut guards = Vec::with_capacity(LOG_TYPES.len());
    let mut appender = |name: &str| {
        let (writer, guard) = create_appender(logs_dir, name);
        guards.push(guard);
        writer
    };

    let main_layer = tracing_subscriber::fmt::layer()
        .with_writer(appender("main"))
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .json();

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(appender("error"))
        .with_ansi(false)
        .with_target(true)
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    let ws_layer = tracing_subscriber::fmt::layer()
        .with_writer(appender("ws"))
        .with_ansi(false)
        .with_target(true)
        .with_filter(target_filter("ws"));

    let rest_layer = tracing_subscriber::fmt::layer()
        .with_writer(appender("rest"))
        .with_ansi(false)
        .with_target(true)
        .with_filter(target_filter("rest"));

    let listener_layer = tracing_subscriber::fmt::layer()
        .with_writer(appender("listener"))
        .with_ansi(false)
        .with_target(true)
        .with_filter(target_filter("listener"));

    // Console layer for development
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(main_layer)
        .with(error_layer)
        .with(ws_layer)
        .with(rest_layer)
        .with(listener_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    tracing::info!("Logging system initialized. Log files in {}", logs_dir.display());

    Ok(guards)
}

/// Keep only records of one target
fn target_filter(
    target: &'static str,
) -> tracing_subscriber::filter::FilterFn<impl Fn(&tracing::Metadata<'_>) -> bool> {
    tracing_subscriber::filter::filter_fn(move |metadata| metadata.target() == target)
}

/// Create a daily rolling file appender
fn create_appender(logs_dir: &Path, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, logs_dir.join(name), name);
    tracing_appender::non_blocking(appender)
}
