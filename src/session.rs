//! Feed session lifecycle
//!
//! `FeedSession::init` builds the shared metrics context, binds the feed
//! socket (and the optional snapshot endpoint), then spawns the receiver
//! and sampler workers. Setup failures are returned from `init` before
//! anything is spawned. `shutdown` raises the stop signal, joins every
//! worker and reports the receiver's terminal error, if any, exactly once.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::aggregator::MetricsAggregator;
use crate::config::{FailurePolicy, FeedConfig};
use crate::error::FeedError;
use crate::http;
use crate::receiver::MulticastFeedReceiver;
use crate::shutdown::{StopSignal, StopToken};
use crate::state::{MetricsSnapshot, SharedMetrics};

/// Summary returned by a clean shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub packets: u64,
    pub decode_warnings: u64,
    pub samples: u64,
    /// Times the receiver was rebuilt under a retry policy.
    pub receiver_restarts: u32,
}

/// A running receiver + sampler pair sharing one metrics context.
pub struct FeedSession {
    config: FeedConfig,
    metrics: Arc<SharedMetrics>,
    signal: StopSignal,
    receiver: JoinHandle<Result<u32, FeedError>>,
    sampler: JoinHandle<u64>,
    http: Option<(SocketAddr, JoinHandle<()>)>,
}

impl FeedSession {
    /// Validate `config`, join the multicast feed and start the workers.
    pub async fn init(config: FeedConfig) -> Result<Self, FeedError> {
        config.validate()?;
        let signal = StopSignal::new();
        let receiver = bind_with_policy(&config, &signal.token()).await?;
        Self::start(config, receiver, signal).await
    }

    /// Start the workers around a receiver built by the caller, e.g. one
    /// wrapping a pre-bound socket via `MulticastFeedReceiver::from_socket`.
    pub async fn with_receiver(
        config: FeedConfig,
        receiver: MulticastFeedReceiver,
    ) -> Result<Self, FeedError> {
        config.validate()?;
        Self::start(config, receiver, StopSignal::new()).await
    }

    async fn start(
        config: FeedConfig,
        receiver: MulticastFeedReceiver,
        signal: StopSignal,
    ) -> Result<Self, FeedError> {
        let metrics = Arc::new(SharedMetrics::from_config(&config));

        let http = match config.http_addr {
            Some(addr) => Some(http::serve(addr, Arc::clone(&metrics), signal.token()).await?),
            None => None,
        };

        let rebind_config = config.clone();
        let receiver = tokio::spawn(supervise_receiver(
            receiver,
            config.failure_policy,
            Arc::clone(&metrics),
            signal.token(),
            move || MulticastFeedReceiver::bind(&rebind_config),
        ));
        let sampler = tokio::spawn(
            MetricsAggregator::new(Arc::clone(&metrics), config.sample_period()).run(signal.token()),
        );

        info!(
            group = %config.group,
            port = config.port,
            sample_period_ms = config.sample_period_ms,
            http_addr = ?http.as_ref().map(|(addr, _)| *addr),
            "Feed session started"
        );

        Ok(Self {
            config,
            metrics,
            signal,
            receiver,
            sampler,
            http,
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Shared metrics context, for presentation consumers that poll.
    pub fn metrics(&self) -> Arc<SharedMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Bound address of the snapshot endpoint, when enabled.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().map(|(addr, _)| *addr)
    }

    /// Whether the receiver worker has exited (stopped or failed).
    pub fn receiver_finished(&self) -> bool {
        self.receiver.is_finished()
    }

    /// Stop both workers, wait for them, and report the outcome.
    pub async fn shutdown(self) -> Result<SessionReport, FeedError> {
        info!("Shutting down feed session");
        self.signal.stop();

        let receiver = self.receiver.await;
        let samples = self.sampler.await;
        if let Some((_, handle)) = self.http {
            if let Err(e) = handle.await {
                warn!(error = %e, "Snapshot endpoint task failed");
            }
        }

        let receiver_restarts = receiver.map_err(|e| FeedError::Task(e.to_string()))??;
        let samples = samples.map_err(|e| FeedError::Task(e.to_string()))?;

        let report = SessionReport {
            packets: self.metrics.packet_count(),
            decode_warnings: self.metrics.decode_warning_count(),
            samples,
            receiver_restarts,
        };
        info!(
            packets = report.packets,
            decode_warnings = report.decode_warnings,
            samples = report.samples,
            receiver_restarts = report.receiver_restarts,
            "Feed session stopped"
        );
        Ok(report)
    }
}

/// Bind the receiver, retrying per the configured failure policy.
async fn bind_with_policy(
    config: &FeedConfig,
    stop: &StopToken,
) -> Result<MulticastFeedReceiver, FeedError> {
    let mut attempt = 0;
    loop {
        let err = match MulticastFeedReceiver::bind(config) {
            Ok(receiver) => return Ok(receiver),
            Err(err) => err,
        };

        attempt += 1;
        let Some(backoff) = config.failure_policy.backoff_for(attempt) else {
            error!(error = %err, attempts = attempt, "Receiver setup failed");
            return Err(err);
        };
        warn!(
            error = %err,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            "Receiver setup failed; retrying"
        );
        if sleep_or_stop(backoff, stop).await {
            return Err(err);
        }
    }
}

/// Run the receiver; on a fatal socket error rebuild it with `rebind` while
/// the failure policy allows. Every rebuild attempt, successful or not,
/// draws from the same policy budget. Returns the number of restarts.
async fn supervise_receiver<F>(
    mut receiver: MulticastFeedReceiver,
    policy: FailurePolicy,
    metrics: Arc<SharedMetrics>,
    stop: StopToken,
    mut rebind: F,
) -> Result<u32, FeedError>
where
    F: FnMut() -> Result<MulticastFeedReceiver, FeedError>,
{
    let mut attempts = 0;
    let mut restarts = 0;
    loop {
        let mut err = match receiver.run(Arc::clone(&metrics), stop.clone()).await {
            Ok(_) => return Ok(restarts),
            Err(err) => err,
        };

        receiver = loop {
            attempts += 1;
            let Some(backoff) = policy.backoff_for(attempts) else {
                error!(error = %err, attempts, "Receiver failed; retry budget exhausted");
                return Err(err);
            };
            warn!(
                error = %err,
                attempt = attempts,
                backoff_ms = backoff.as_millis() as u64,
                "Receiver failed; restarting"
            );
            if sleep_or_stop(backoff, &stop).await {
                return Err(err);
            }
            match rebind() {
                Ok(receiver) => break receiver,
                Err(e) => err = e,
            }
        };
        restarts += 1;
    }
}

/// Sleep for `duration`; returns `true` if the stop signal fired first.
async fn sleep_or_stop(duration: Duration, stop: &StopToken) -> bool {
    tokio::select! {
        _ = stop.stopped() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
