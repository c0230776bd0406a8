//! Configuration management
//!
//! Loads configuration from config.toml at startup.
//! Every timeout, retry bound and cooldown is tunable here; durations are
//! written in seconds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Connector configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// REST executor settings
    #[serde(default)]
    pub rest: RestConfig,

    /// WebSocket session settings
    #[serde(default)]
    pub websocket: WebSocketConfig,

    /// Stream listener settings
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Default throttle gate settings
    #[serde(default)]
    pub throttle: ThrottleConfig,
}

/// REST executor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestConfig {
    /// Base URL; endpoints are appended as `{base_url}/{endpoint}`
    #[serde(default = "default_rest_url")]
    pub base_url: String,

    /// Timeout for a single HTTP attempt
    #[serde(default = "default_rest_timeout")]
    pub timeout_secs: f64,

    /// Retries after the first attempt before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// WebSocket session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSocketConfig {
    /// Endpoint for sessions without credentials
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Endpoint for authenticated sessions
    #[serde(default = "default_private_url")]
    pub private_url: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: f64,

    /// Idle time before the receive loop pings the venue
    #[serde(default = "default_message_timeout")]
    pub message_timeout_secs: f64,

    /// How long a ping may go unanswered
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: f64,

    /// How long to wait for the login acknowledgment
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: f64,

    /// Bound on one outbound frame, including waiting for the writer
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: f64,

    #[serde(default = "default_close_timeout")]
    pub close_timeout_secs: f64,
}

/// Stream listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    /// Pause after a session dies
    #[serde(default = "default_inner_cooldown")]
    pub inner_cooldown_secs: f64,

    /// Pause before the next full reconnect cycle
    #[serde(default = "default_outer_cooldown")]
    pub outer_cooldown_secs: f64,

    /// Channels subscribed on every (re)connect
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// One channel subscription
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    /// Channel suffix, e.g. `Reports` for `subscribeReports`
    pub channel: String,

    /// Trading pair injected as `symbol`, if the channel takes one
    #[serde(default)]
    pub symbol: Option<String>,

    /// Extra params merged into the frame
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Keyed concurrency gate configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThrottleConfig {
    /// Concurrent requests admitted per throttle key
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-key overrides of `max_concurrent`
    #[serde(default)]
    pub limits: HashMap<String, usize>,
}

impl RestConfig {
    #[inline]
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }
}

impl WebSocketConfig {
    /// URL for a session, private when credentials are present
    pub fn url(&self, private: bool) -> &str {
        if private {
            &self.private_url
        } else {
            &self.public_url
        }
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        secs(self.connect_timeout_secs)
    }

    #[inline]
    pub fn message_timeout(&self) -> Duration {
        secs(self.message_timeout_secs)
    }

    #[inline]
    pub fn ping_timeout(&self) -> Duration {
        secs(self.ping_timeout_secs)
    }

    #[inline]
    pub fn login_timeout(&self) -> Duration {
        secs(self.login_timeout_secs)
    }

    #[inline]
    pub fn send_timeout(&self) -> Duration {
        secs(self.send_timeout_secs)
    }

    #[inline]
    pub fn close_timeout(&self) -> Duration {
        secs(self.close_timeout_secs)
    }
}

impl ListenerConfig {
    #[inline]
    pub fn inner_cooldown(&self) -> Duration {
        secs(self.inner_cooldown_secs)
    }

    #[inline]
    pub fn outer_cooldown(&self) -> Duration {
        secs(self.outer_cooldown_secs)
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_rest_url(),
            timeout_secs: default_rest_timeout(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            public_url: default_public_url(),
            private_url: default_private_url(),
            connect_timeout_secs: default_connect_timeout(),
            message_timeout_secs: default_message_timeout(),
            ping_timeout_secs: default_ping_timeout(),
            login_timeout_secs: default_login_timeout(),
            send_timeout_secs: default_send_timeout(),
            close_timeout_secs: default_close_timeout(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            inner_cooldown_secs: default_inner_cooldown(),
            outer_cooldown_secs: default_outer_cooldown(),
            subscriptions: Vec::new(),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            limits: HashMap::new(),
        }
    }
}

/// Negative and non-finite values collapse to zero instead of panicking
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn default_rest_url() -> String {
    "https://api.hitbtc.com/api/2".to_string()
}

fn default_rest_timeout() -> f64 {
    10.0
}

fn default_max_retries() -> u32 {
    4
}

fn default_user_agent() -> String {
    concat!("venue-link/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_public_url() -> String {
    "wss://api.hitbtc.com/api/2/ws/public".to_string()
}

fn default_private_url() -> String {
    "wss://api.hitbtc.com/api/2/ws/trading".to_string()
}

fn default_connect_timeout() -> f64 {
    10.0
}

fn default_message_timeout() -> f64 {
    30.0
}

fn default_ping_timeout() -> f64 {
    10.0
}

fn default_login_timeout() -> f64 {
    3.0
}

fn default_send_timeout() -> f64 {
    10.0
}

fn default_close_timeout() -> f64 {
    5.0
}

fn default_inner_cooldown() -> f64 {
    5.0
}

fn default_outer_cooldown() -> f64 {
    30.0
}

fn default_max_concurrent() -> usize {
    10
}

impl Config {
    /// Load configuration from the file named by `CONFIG_PATH` (default `config.toml`)
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}
