//! Shared metrics state
//!
//! One `SharedMetrics` is built per session and handed to both workers via
//! `Arc`. The packet counter and the current mid price are atomics written
//! only by the receiver. The rolling buffers live behind a single mutex:
//! the sampler owns the price/throughput series, the receiver owns the log,
//! and `snapshot()` copies all of them under that same lock so a reader
//! never sees one buffer advanced without the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::buffers::{LogBuffer, TimeSeriesBuffer};
use crate::config::FeedConfig;

/// Point-in-time copy of the aggregated metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Mid-price samples, oldest first.
    pub price_series: Vec<f64>,
    /// Throughput samples in packets/second, oldest first.
    pub throughput_series: Vec<u64>,
    /// Recent decoder log, most recent last.
    pub log_lines: Vec<String>,
    pub current_mid_price: f64,
    /// Latest throughput sample.
    pub current_tps: u64,
}

#[derive(Debug)]
struct MetricsBuffers {
    price_series: TimeSeriesBuffer<f64>,
    throughput_series: TimeSeriesBuffer<u64>,
    log: LogBuffer,
}

/// Metrics shared between the receiver, the sampler and snapshot readers.
#[derive(Debug)]
pub struct SharedMetrics {
    packet_counter: AtomicU64,
    /// `f64` bit pattern.
    mid_price_bits: AtomicU64,
    decode_warnings: AtomicU64,
    buffers: Mutex<MetricsBuffers>,
}

impl SharedMetrics {
    pub fn new(
        price_history_len: usize,
        throughput_history_len: usize,
        log_capacity: usize,
        initial_mid_price: f64,
    ) -> Self {
        Self {
            packet_counter: AtomicU64::new(0),
            mid_price_bits: AtomicU64::new(initial_mid_price.to_bits()),
            decode_warnings: AtomicU64::new(0),
            buffers: Mutex::new(MetricsBuffers {
                price_series: TimeSeriesBuffer::filled(price_history_len, initial_mid_price),
                throughput_series: TimeSeriesBuffer::filled(throughput_history_len, 0),
                log: LogBuffer::new(log_capacity),
            }),
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(
            config.price_history_len,
            config.throughput_history_len,
            config.log_capacity,
            config.initial_mid_price,
        )
    }

    /// Count one received datagram. Receiver only.
    pub fn record_packet(&self) -> u64 {
        self.packet_counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn packet_count(&self) -> u64 {
        self.packet_counter.load(Ordering::Acquire)
    }

    pub fn current_mid_price(&self) -> f64 {
        f64::from_bits(self.mid_price_bits.load(Ordering::Acquire))
    }

    pub fn decode_warning_count(&self) -> u64 {
        self.decode_warnings.load(Ordering::Relaxed)
    }

    /// Publish the outcome of one decoded datagram: the new mid price (if
    /// any) and its log lines land together under the buffer lock.
    pub fn record_update<I>(&self, mid_price: Option<f64>, lines: I, warnings: usize)
    where
        I: IntoIterator<Item = String>,
    {
        if warnings > 0 {
            self.decode_warnings
                .fetch_add(warnings as u64, Ordering::Relaxed);
        }

        let mut buffers = self.lock();
        if let Some(mid) = mid_price {
            self.mid_price_bits.store(mid.to_bits(), Ordering::Release);
        }
        for line in lines {
            buffers.log.push(line);
        }
    }

    /// Append a throughput sample and the current mid price. Sampler only.
    ///
    /// Returns the mid price that was sampled.
    pub fn record_sample(&self, tps: u64) -> f64 {
        let mut buffers = self.lock();
        let mid = self.current_mid_price();
        buffers.throughput_series.push(tps);
        buffers.price_series.push(mid);
        mid
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let buffers = self.lock();
        MetricsSnapshot {
            price_series: buffers.price_series.to_vec(),
            throughput_series: buffers.throughput_series.to_vec(),
            log_lines: buffers.log.to_vec(),
            current_mid_price: self.current_mid_price(),
            current_tps: buffers.throughput_series.latest().copied().unwrap_or(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsBuffers> {
        // Every mutation under this lock is a single push; poisoning is ignored.
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SharedMetrics {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default())
    }
}
