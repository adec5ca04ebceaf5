//! Read-only snapshot endpoint for presentation consumers.
//!
//! - `GET /snapshot` returns the current `MetricsSnapshot` as JSON
//! - `GET /health` returns `{"status":"ok","packets":N}`
//!
//! Handlers only ever read snapshots; nothing here can reach the workers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::FeedError;
use crate::shutdown::StopToken;
use crate::state::{MetricsSnapshot, SharedMetrics};

pub fn router(metrics: Arc<SharedMetrics>) -> Router {
    Router::new()
        .route("/snapshot", get(snapshot))
        .route("/health", get(health))
        .with_state(metrics)
}

async fn snapshot(State(metrics): State<Arc<SharedMetrics>>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}

async fn health(State(metrics): State<Arc<SharedMetrics>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "packets": metrics.packet_count(),
    }))
}

/// Bind `addr` and serve until `stop` fires. Returns the bound address
/// (useful when `addr` has port 0) and the server task.
pub async fn serve(
    addr: SocketAddr,
    metrics: Arc<SharedMetrics>,
    stop: StopToken,
) -> Result<(SocketAddr, JoinHandle<()>), FeedError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| FeedError::HttpBind { addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| FeedError::HttpBind { addr, source })?;

    info!(addr = %local_addr, "Snapshot endpoint listening");

    let app = router(metrics);
    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.stopped().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "Snapshot endpoint failed");
        }
    });

    Ok((local_addr, handle))
}
