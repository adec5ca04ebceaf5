use std::future::Future;
use std::time::Duration;

use feed_monitor::{FeedConfig, FeedSession, MetricsSnapshot};

/// How often the console sink logs a snapshot summary.
const SUMMARY_INTERVAL: Duration = Duration::from_secs(1);

/// Why the console loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Interrupted,
    ReceiverFinished,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    tracing::info!(version = feed_monitor::SERVICE_VERSION, "Starting feed monitor");

    let config = FeedConfig::from_env()?;
    let session = FeedSession::init(config).await?;

    watch_feed(&session, tokio::signal::ctrl_c(), SUMMARY_INTERVAL).await;

    session.shutdown().await?;
    Ok(())
}

/// Log a summary every `interval` until `interrupt` resolves or the
/// receiver exits. `interrupt` is polled across every tick, so a signal
/// arriving between ticks is never lost.
async fn watch_feed<F: Future>(session: &FeedSession, interrupt: F, interval: Duration) -> Exit {
    tokio::pin!(interrupt);

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = &mut interrupt => {
                tracing::info!("Interrupt received");
                return Exit::Interrupted;
            }
            _ = ticker.tick() => {
                log_summary(&session.snapshot());
                if session.receiver_finished() {
                    tracing::warn!("Receiver exited; shutting down");
                    return Exit::ReceiverFinished;
                }
            }
        }
    }
}

fn log_summary(snapshot: &MetricsSnapshot) {
    tracing::info!(
        mid_price = %format!("{:.2}", snapshot.current_mid_price),
        tps = snapshot.current_tps,
        last = snapshot.log_lines.last().map(String::as_str).unwrap_or("-"),
        "Feed"
    );
}
