//! Subscriber configuration.
//!
//! Configuration is layered from:
//! - The first TOML file found in the default paths
//! - Environment variables (`REDISN_*`, `__` between nested keys)

use anyhow::{Context, Result};
use config::{Environment, File, FileFormat};
use redisn_core::SubscriberConfig;
use redisn_transport::PoolConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_PATHS: [&str; 3] = [
    "redisn.toml",
    "/etc/redisn/redisn.toml",
    "~/.config/redisn/redisn.toml",
];

/// Subscriber configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connection pool.
    #[serde(default)]
    pub pool: ConnectionPoolConfig,

    /// Session behaviour.
    #[serde(default)]
    pub subscriber: SessionConfig,

    /// What to subscribe to.
    #[serde(default)]
    pub subscribe: SubscribeConfig,

    /// Shutdown behaviour.
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPoolConfig {
    /// Maximum number of open connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Wait between acquire attempts when the pool is exhausted.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// Give up acquiring after this long; 0 waits forever.
    #[serde(default)]
    pub acquire_timeout_ms: u64,

    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Handshake timeout; 0 waits forever.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    /// Capacity of the dispatcher's control channel.
    #[serde(default = "default_control_buffer")]
    pub control_buffer: usize,
}

/// Subscription targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeConfig {
    /// Channels to `SUBSCRIBE` to.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Patterns to `PSUBSCRIBE` to.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long to wait for the session to drain before cancelling it.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_max_connections() -> usize {
    10
}

fn default_retry_interval() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    5_000
}

fn default_handshake_timeout() -> u64 {
    10_000
}

fn default_control_buffer() -> usize {
    32
}

fn default_drain_timeout() -> u64 {
    5_000
}

fn default_metrics_port() -> u16 {
    9090
}

/// Zero disables a timeout.
fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            pool: ConnectionPoolConfig::default(),
            subscriber: SessionConfig::default(),
            subscribe: SubscribeConfig::default(),
            shutdown: ShutdownConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            retry_interval_ms: default_retry_interval(),
            acquire_timeout_ms: 0,
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout(),
            control_buffer: default_control_buffer(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: default_drain_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl ConnectionPoolConfig {
    /// Pool settings for the transport layer.
    #[must_use]
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.max_connections,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            acquire_timeout: optional_millis(self.acquire_timeout_ms),
        }
    }

    /// TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl SessionConfig {
    /// Session settings for the subscriber.
    #[must_use]
    pub fn to_subscriber_config(&self) -> SubscriberConfig {
        SubscriberConfig {
            handshake_timeout: optional_millis(self.handshake_timeout_ms),
            control_buffer: self.control_buffer,
        }
    }
}

impl ShutdownConfig {
    /// Drain timeout as a duration.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Config {
    /// Load configuration from the default paths and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// an environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let file = CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists());

        Self::layered(file.as_deref(), environment())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    fn layered(file: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder
            .add_source(env)
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Server address to connect to.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn environment() -> Environment {
    Environment::with_prefix("REDISN")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("subscribe.channels")
        .with_list_parse_key("subscribe.patterns")
        .try_parsing(true)
}
