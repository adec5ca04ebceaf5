//! Multicast feed receiver
//!
//! Binds a UDP socket with address reuse, joins the configured multicast
//! group on the configured interface, and runs the receive loop:
//!
//! ```text
//!   ┌──────────────┐ stopped?  ┌──────┐
//!   │ top of loop  ├──────────►│ exit │
//!   └──────┬───────┘           └──────┘
//!          │ recv (bounded by timeout, raced against stop)
//!          ▼
//!   timeout ──► back to top
//!   datagram ─► count → decode → mid price + log line
//!   error ────► loop ends, error returned to the caller
//! ```
//!
//! Setup failures are returned from `bind` and the loop is never entered.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::config::FeedConfig;
use crate::decoder::{decode, DecodeWarning, MarketUpdate};
use crate::error::FeedError;
use crate::shutdown::StopToken;
use crate::state::SharedMetrics;

/// Characters of raw payload shown for one-sided or unparsed messages.
pub const RAW_PREVIEW_CHARS: usize = 50;

/// Counters reported when the receive loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverStats {
    pub datagrams: u64,
    pub bytes: u64,
    pub decode_warnings: u64,
}

/// Owns the feed socket for the lifetime of one receive loop.
#[derive(Debug)]
pub struct MulticastFeedReceiver {
    socket: UdpSocket,
    local_addr: SocketAddr,
    max_datagram_size: usize,
    recv_timeout: Duration,
}

impl MulticastFeedReceiver {
    /// Bind and join the group described by `config`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: &FeedConfig) -> Result<Self, FeedError> {
        let socket = open_multicast_socket(config)?;
        info!(
            group = %config.group,
            port = config.port,
            interface = %config.interface,
            "Joined multicast feed"
        );
        Self::from_socket(socket, config.max_datagram_size, config.recv_timeout())
    }

    /// Wrap an already-bound socket. No group is joined; the socket is
    /// switched to non-blocking mode.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_socket(
        socket: std::net::UdpSocket,
        max_datagram_size: usize,
        recv_timeout: Duration,
    ) -> Result<Self, FeedError> {
        let local_addr = socket.local_addr().map_err(|source| FeedError::Bind {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            source,
        })?;
        let bind_err = |source| FeedError::Bind {
            addr: local_addr,
            source,
        };
        socket.set_nonblocking(true).map_err(bind_err)?;
        let socket = UdpSocket::from_std(socket).map_err(bind_err)?;

        Ok(Self {
            socket,
            local_addr,
            max_datagram_size,
            recv_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive until `stop` is raised or the socket fails.
    ///
    /// The socket is dropped (released) when this returns.
    pub async fn run(
        self,
        metrics: Arc<SharedMetrics>,
        stop: StopToken,
    ) -> Result<ReceiverStats, FeedError> {
        let mut buf = vec![0u8; self.max_datagram_size];
        let mut stats = ReceiverStats::default();

        info!(
            local_addr = %self.local_addr,
            max_datagram_size = self.max_datagram_size,
            recv_timeout_ms = self.recv_timeout.as_millis() as u64,
            "Receiver loop started"
        );

        loop {
            if stop.is_stopped() {
                break;
            }

            let received = tokio::select! {
                _ = stop.stopped() => break,
                res = tokio::time::timeout(self.recv_timeout, self.socket.recv(&mut buf)) => res,
            };

            let len = match received {
                // Timeout: nothing arrived, go round and check the stop flag.
                Err(_) => continue,
                Ok(Ok(len)) => len,
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => {
                    error!(
                        error = %e,
                        datagrams = stats.datagrams,
                        "Socket error on active receive; receiver stopping"
                    );
                    return Err(FeedError::Receive(e));
                }
            };

            if len == buf.len() {
                warn!(
                    max_datagram_size = self.max_datagram_size,
                    "Datagram filled the receive buffer and may be truncated"
                );
            }

            let update = process_datagram(&metrics, &buf[..len], &log_timestamp());
            stats.datagrams += 1;
            stats.bytes += len as u64;
            stats.decode_warnings += update.warnings.len() as u64;
        }

        info!(
            datagrams = stats.datagrams,
            bytes = stats.bytes,
            decode_warnings = stats.decode_warnings,
            "Receiver loop stopped"
        );
        Ok(stats)
    }
}

fn open_multicast_socket(config: &FeedConfig) -> Result<std::net::UdpSocket, FeedError> {
    let addr = config.bind_addr();
    let bind_err = |source| FeedError::Bind { addr, source };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    socket
        .join_multicast_v4(&config.group, &config.interface)
        .map_err(|source| FeedError::JoinGroup {
            group: config.group,
            interface: config.interface,
            source,
        })?;

    Ok(socket.into())
}

/// Handle one received datagram: count it, decode it, publish the mid price
/// and append its log line(s).
pub fn process_datagram(metrics: &SharedMetrics, payload: &[u8], timestamp: &str) -> MarketUpdate {
    metrics.record_packet();
    let update = decode(payload);

    let mut lines = Vec::with_capacity(2);
    lines.push(format_log_line(&update, timestamp));
    if update.has_warnings() {
        for warning in &update.warnings {
            debug!(warning = %warning, "Decode warning");
        }
        lines.push(format_warning_line(&update.warnings, timestamp));
    }

    metrics.record_update(update.mid_price, lines, update.warnings.len());
    update
}

/// Bid/ask summary for two-sided updates, raw preview otherwise.
pub fn format_log_line(update: &MarketUpdate, timestamp: &str) -> String {
    if update.is_two_sided() {
        let symbol = update.symbol.as_deref().unwrap_or("???");
        format!(
            "[{}] {:<4} | BID {:.2} ({}) x ASK {:.2} ({})",
            timestamp, symbol, update.bid_price, update.bid_size, update.ask_price, update.ask_size
        )
    } else {
        let preview: String = update.raw_text.chars().take(RAW_PREVIEW_CHARS).collect();
        format!("[{}] RAW: {}...", timestamp, preview)
    }
}

pub fn format_warning_line(warnings: &[DecodeWarning], timestamp: &str) -> String {
    let joined = warnings
        .iter()
        .map(|w| w.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    format!("[{}] WARN: {}", timestamp, joined)
}

fn log_timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
