//! Multicast Market-Data Feed Monitor
//!
//! Receives a tag=value market-data feed over UDP multicast and keeps
//! rolling metrics for a presentation layer:
//! - Bid/ask decoding per datagram (tags 35/55/269/270/271)
//! - Mid-price history sampled on a fixed period
//! - Throughput (packets/second) history
//! - Recent decoder log
//!
//! # Architecture
//!
//! ```text
//!   UDP multicast
//!        │
//!   ┌────▼─────┐   decode    ┌─────────┐
//!   │ Receiver ├────────────►│ Decoder │
//!   └────┬─────┘             └─────────┘
//!        │ counter, mid price, log
//!   ┌────▼──────────┐
//!   │ SharedMetrics │◄──── Sampler (every period: tps + mid → series)
//!   └────┬──────────┘
//!        │ snapshot()
//!   ┌────▼──────────────────────┐
//!   │ Presentation (HTTP / log) │
//!   └───────────────────────────┘
//! ```

pub mod aggregator;
pub mod buffers;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod generator;
pub mod http;
pub mod publisher;
pub mod receiver;
pub mod session;
pub mod shutdown;
pub mod state;

pub use aggregator::MetricsAggregator;
pub use config::{FailurePolicy, FeedConfig};
pub use decoder::{decode, DecodeWarning, MarketUpdate};
pub use error::{ConfigError, FeedError};
pub use receiver::MulticastFeedReceiver;
pub use session::{FeedSession, SessionReport};
pub use shutdown::{StopSignal, StopToken};
pub use state::{MetricsSnapshot, SharedMetrics};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
