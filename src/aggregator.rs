//! Metrics aggregator
//!
//! Samples the shared packet counter on a fixed period. Each tick closes
//! the window since the previous tick: `delta = count_now - count_prev`
//! is converted to packets/second and appended to the throughput series
//! together with the current mid price. Windows never overlap, so every
//! packet is counted in exactly one sample.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::shutdown::StopToken;
use crate::state::SharedMetrics;

/// Result of one sampling tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Packets received in the closed window.
    pub delta: u64,
    /// Packets per second over the window.
    pub tps: u64,
    /// Mid price appended to the price series.
    pub mid_price: f64,
}

/// Convert a per-window packet count into packets per second.
///
/// Integer arithmetic in microseconds so that a 100ms window yields exactly
/// `delta * 10`.
pub fn throughput(delta: u64, period: Duration) -> u64 {
    let micros = period.as_micros();
    if micros == 0 {
        return 0;
    }
    let tps = (delta as u128 * 1_000_000) / micros;
    tps.min(u64::MAX as u128) as u64
}

/// Periodic sampler; sole writer of the price and throughput series.
#[derive(Debug)]
pub struct MetricsAggregator {
    metrics: Arc<SharedMetrics>,
    period: Duration,
    previous_count: u64,
    ticks: u64,
}

impl MetricsAggregator {
    pub fn new(metrics: Arc<SharedMetrics>, period: Duration) -> Self {
        let previous_count = metrics.packet_count();
        Self {
            metrics,
            period,
            previous_count,
            ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Close the current window and append one sample.
    pub fn sample(&mut self) -> Sample {
        let now = self.metrics.packet_count();
        // The counter only grows, so this never saturates in practice.
        let delta = now.saturating_sub(self.previous_count);
        let tps = throughput(delta, self.period);
        let mid_price = self.metrics.record_sample(tps);

        self.previous_count = now;
        self.ticks += 1;

        debug!(delta, tps, mid_price, "Metrics sample");
        Sample {
            delta,
            tps,
            mid_price,
        }
    }

    /// Sample every `period` until `stop` is raised. Returns the number of
    /// samples taken.
    pub async fn run(mut self, stop: StopToken) -> u64 {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_ms = self.period.as_millis() as u64, "Sampler started");

        loop {
            if stop.is_stopped() {
                break;
            }
            tokio::select! {
                _ = stop.stopped() => break,
                _ = ticker.tick() => {}
            }
            self.sample();
        }

        info!(ticks = self.ticks, "Sampler stopped");
        self.ticks
    }
}
