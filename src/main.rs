//! venue-link: keeps a venue WebSocket stream alive and logs what it delivers
//!
//! Public stream by default; set `VENUE_API_KEY` and `VENUE_API_SECRET` for an
//! authenticated one. Settings come from `CONFIG_PATH` (default `config.toml`).

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use venue_link::core::{HmacAuth, NonceIdSource};
use venue_link::infrastructure::logging::init_logging;
use venue_link::{Config, Result, StreamListener, VenueError};

const LOGS_DIR: &str = "logs";

/// Main application state
pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn listener(&self) -> Result<StreamListener> {
        let key = std::env::var("VENUE_API_KEY").ok();
        let secret = std::env::var("VENUE_API_SECRET").ok();

        match (key, secret) {
            (Some(key), Some(secret)) => {
                let auth = HmacAuth::new(key, &secret)?;
                tracing::info!("Credentials found, using private stream");
                Ok(StreamListener::from_config("private", &self.config)
                    .with_auth(Arc::new(auth))
                    .with_ids(Arc::new(NonceIdSource::new())))
            }
            _ => Ok(StreamListener::from_config("public", &self.config)),
        }
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener()?;
        let health = listener.health();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tracing::info!(
            stream = listener.name(),
            subscriptions = self.config.listener.subscriptions.len(),
            "Starting stream listener"
        );

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { listener.run(tx, cancel).await })
        };

        let consumer = tokio::spawn(async move {
            while let Some(doc) = rx.recv().await {
                tracing::info!(target: "listener", "{}", doc);
            }
        });

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
        tracing::info!("Shutting down...");
        cancel.cancel();

        let outcome = task
            .await
            .map_err(|e| VenueError::Config(format!("listener task failed: {}", e)))?;
        consumer.await.ok();

        let snapshot = health.snapshot();
        tracing::info!(
            messages = snapshot.messages,
            reconnects = snapshot.reconnects,
            "Listener stopped"
        );

        match outcome {
            Ok(()) | Err(VenueError::Cancelled) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guards = init_logging(Path::new(LOGS_DIR))
        .map_err(|e| VenueError::Config(format!("failed to initialize logging: {}", e)))?;

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load config ({}), using defaults", e);
            Config::default()
        }
    };

    App::new(config).run().await
}
