//! Error taxonomy for the feed monitor
//!
//! Setup failures (bind/join) and fatal socket errors are surfaced through
//! `FeedError`. Receive timeouts never become errors, and decode problems are
//! carried on the update itself as `DecodeWarning`s (see `decoder`).

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors surfaced by the receiver, the session and the publisher.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to join multicast group {group} on interface {interface}: {source}")]
    JoinGroup {
        group: Ipv4Addr,
        interface: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    #[error("socket error while receiving: {0}")]
    Receive(#[source] io::Error),

    #[error("socket error while sending: {0}")]
    Send(#[source] io::Error),

    #[error("failed to bind snapshot endpoint on {addr}: {source}")]
    HttpBind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("worker task failed: {0}")]
    Task(String),
}

impl FeedError {
    /// Whether this error happened before the receive loop was entered.
    pub fn is_setup(&self) -> bool {
        matches!(self, FeedError::Bind { .. } | FeedError::JoinGroup { .. })
    }
}
