//! Configuration for the feed monitor and the test feed producer
//!
//! Loaded from a JSON file. Every field carries a default, so an empty
//! object (`{}`) yields the standard local setup: group 239.255.1.1:9999
//! joined on the loopback interface, 1s receive timeout, 100ms sampling.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable the binaries read the config path from.
pub const CONFIG_ENV_VAR: &str = "FEED_MONITOR_CONFIG";

/// What to do when the socket fails (bind/join at startup, or an
/// unexpected error on an active receive).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum FailurePolicy {
    /// Single attempt; the failure is reported and the receiver stays down.
    #[default]
    FailFast,
    /// Rebuild the socket up to `max_attempts` times, doubling the backoff
    /// after each failed attempt.
    Retry { max_attempts: u32, backoff_ms: u64 },
}

impl FailurePolicy {
    /// Backoff before retry number `attempt` (1-based), or `None` once the
    /// policy is exhausted.
    pub fn backoff_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            FailurePolicy::FailFast => None,
            FailurePolicy::Retry {
                max_attempts,
                backoff_ms,
            } => {
                if attempt == 0 || attempt > max_attempts {
                    return None;
                }
                let factor = 1u64 << (attempt - 1).min(16);
                Some(Duration::from_millis(backoff_ms.saturating_mul(factor)))
            }
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Multicast group address.
    #[serde(default = "default_group")]
    pub group: Ipv4Addr,

    /// UDP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Local interface address the group is joined on.
    #[serde(default = "default_interface")]
    pub interface: Ipv4Addr,

    /// Receive buffer size; longer datagrams are truncated.
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,

    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,

    #[serde(default = "default_price_history_len")]
    pub price_history_len: usize,

    #[serde(default = "default_throughput_history_len")]
    pub throughput_history_len: usize,

    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Mid price reported before the first two-sided update arrives.
    #[serde(default = "default_initial_mid_price")]
    pub initial_mid_price: f64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Address for the JSON snapshot endpoint; disabled when absent.
    #[serde(default)]
    pub http_addr: Option<SocketAddr>,

    #[serde(default)]
    pub producer: ProducerConfig,
}

fn default_group() -> Ipv4Addr {
    Ipv4Addr::new(239, 255, 1, 1)
}

fn default_port() -> u16 {
    9999
}

fn default_interface() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}

fn default_max_datagram_size() -> usize {
    4096
}

fn default_recv_timeout_ms() -> u64 {
    1000
}

fn default_sample_period_ms() -> u64 {
    100
}

fn default_price_history_len() -> usize {
    100
}

fn default_throughput_history_len() -> usize {
    50
}

fn default_log_capacity() -> usize {
    12
}

fn default_initial_mid_price() -> f64 {
    100.0
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            group: default_group(),
            port: default_port(),
            interface: default_interface(),
            max_datagram_size: default_max_datagram_size(),
            recv_timeout_ms: default_recv_timeout_ms(),
            sample_period_ms: default_sample_period_ms(),
            price_history_len: default_price_history_len(),
            throughput_history_len: default_throughput_history_len(),
            log_capacity: default_log_capacity(),
            initial_mid_price: default_initial_mid_price(),
            failure_policy: FailurePolicy::default(),
            http_addr: None,
            producer: ProducerConfig::default(),
        }
    }
}

impl FeedConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `FEED_MONITOR_CONFIG`, or fall back to
    /// defaults when the variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.group.is_multicast() {
            return Err(ConfigError::Invalid(format!(
                "group {} is not a multicast address",
                self.group
            )));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        if self.max_datagram_size == 0 {
            return Err(ConfigError::Invalid(
                "max_datagram_size must be non-zero".to_string(),
            ));
        }
        if self.recv_timeout_ms == 0 || self.sample_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "recv_timeout_ms and sample_period_ms must be non-zero".to_string(),
            ));
        }
        if self.price_history_len == 0 || self.throughput_history_len == 0 || self.log_capacity == 0
        {
            return Err(ConfigError::Invalid(
                "history and log capacities must be non-zero".to_string(),
            ));
        }
        self.producer.validate()
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    /// Local address the receive socket binds to (all interfaces).
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Destination address for published datagrams.
    pub fn group_addr(&self) -> SocketAddr {
        SocketAddr::from((self.group, self.port))
    }
}

/// Price model used by the test feed producer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PriceModel {
    RandomWalk { step: f64 },
    Gbm { mu: f64, sigma: f64, dt: f64 },
}

impl Default for PriceModel {
    fn default() -> Self {
        PriceModel::RandomWalk { step: 0.01 }
    }
}

/// Settings for the `feed-producer` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_start_price")]
    pub start_price: f64,
    /// Ask is quoted at bid + spread.
    #[serde(default = "default_spread")]
    pub spread: f64,
    #[serde(default = "default_bid_size")]
    pub bid_size: i64,
    #[serde(default = "default_ask_size")]
    pub ask_size: i64,
    #[serde(default)]
    pub model: PriceModel,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_symbol() -> String {
    "ESZ5".to_string()
}

fn default_interval_ms() -> u64 {
    100
}

fn default_start_price() -> f64 {
    100.0
}

fn default_spread() -> f64 {
    0.25
}

fn default_bid_size() -> i64 {
    100
}

fn default_ask_size() -> i64 {
    75
}

fn default_ttl() -> u32 {
    1
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            interval_ms: default_interval_ms(),
            start_price: default_start_price(),
            spread: default_spread(),
            bid_size: default_bid_size(),
            ask_size: default_ask_size(),
            model: PriceModel::default(),
            seed: 0,
            ttl: default_ttl(),
        }
    }
}

impl ProducerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.is_empty() {
            return Err(ConfigError::Invalid("producer symbol is empty".to_string()));
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "producer interval_ms must be non-zero".to_string(),
            ));
        }
        if !(self.start_price > 0.0) || !(self.spread >= 0.0) {
            return Err(ConfigError::Invalid(
                "producer start_price must be positive and spread non-negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
