//! Client configuration with validation.
//!
//! Every section is `#[serde(default)]` so a config file only needs the
//! values it changes. Durations use humantime notation (`"30s"`, `"1m"`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding [`ClientConfig::base_url`].
pub const ENV_BASE_URL: &str = "DH_BASE_URL";
/// Environment variable overriding [`ClientConfig::access_key`].
pub const ENV_ACCESS_KEY: &str = "DH_ACCESS_KEY";
/// Environment variable overriding the default call timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "DH_TIMEOUT_SECS";

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server base URL, e.g. `http://host/api` or `ws://host/api/websocket`
    pub base_url: String,
    /// Access key sent as a bearer token [optional]
    pub access_key: Option<String>,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// WebSocket transport configuration
    pub websocket: WebSocketConfig,
    /// Push listener configuration
    pub listener: ListenerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/dh/rest".to_string(),
            access_key: None,
            timeouts: TimeoutConfig::default(),
            websocket: WebSocketConfig::default(),
            listener: ListenerConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration for `base_url` with every other value defaulted.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.access_key = (!key.is_empty()).then_some(key);
        self
    }

    /// Defaults overlaid with `DH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            config.base_url = url;
        }
        if let Ok(key) = std::env::var(ENV_ACCESS_KEY) {
            config = config.with_access_key(key);
        }
        if let Ok(secs) = std::env::var(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs.parse().map_err(|_| {
                ConfigError::InvalidTimeout(format!("{ENV_TIMEOUT_SECS}={secs:?} is not a number"))
            })?;
            config.timeouts.default = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url().is_empty() {
            return Err(ConfigError::InvalidUrl("base_url cannot be empty".into()));
        }

        if let Some(key) = &self.access_key {
            if key.chars().any(|c| c.is_control()) {
                return Err(ConfigError::InvalidAccessKey(
                    "access key contains control characters".into(),
                ));
            }
        }

        // Validate timeouts
        if self.timeouts.default.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "default timeout cannot be 0".into(),
            ));
        }
        if self.timeouts.poll.is_zero() {
            return Err(ConfigError::InvalidTimeout("poll timeout cannot be 0".into()));
        }
        if self.timeouts.poll_wait >= self.timeouts.poll {
            return Err(ConfigError::InvalidTimeout(format!(
                "poll_wait ({:?}) must be shorter than poll ({:?})",
                self.timeouts.poll_wait, self.timeouts.poll
            )));
        }

        // Validate capacities
        if self.websocket.send_queue == 0 {
            return Err(ConfigError::InvalidCapacity(
                "websocket send_queue cannot be 0".into(),
            ));
        }
        if self.listener.capacity == 0 {
            return Err(ConfigError::InvalidCapacity(
                "listener capacity cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Applied to every call made without an explicit timeout
    #[serde(with = "humantime_serde")]
    pub default: Duration,
    /// How long the server may hold a poll request open
    #[serde(with = "humantime_serde")]
    pub poll_wait: Duration,
    /// Client-side bound on a single poll request
    #[serde(with = "humantime_serde")]
    pub poll: Duration,
    /// Pause between failed polls
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(60),
            poll_wait: Duration::from_secs(30),
            poll: Duration::from_secs(60),
            retry_interval: Duration::from_secs(5),
        }
    }
}

/// Which WebSocket API to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    /// Device API at `<base>/device`
    #[default]
    Device,
    /// Client API at `<base>/client`
    Client,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Client => "client",
        }
    }
}

/// WebSocket transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub endpoint: Endpoint,
    /// Frames waiting for the send worker (default: 64)
    pub send_queue: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Device,
            send_queue: 64,
        }
    }
}

/// Push listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Undelivered items buffered per listener (default: 64)
    pub capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Missing or unusable server URL
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Access key unusable as a header value
    #[error("invalid access key: {0}")]
    InvalidAccessKey(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid queue or buffer size
    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),
}
