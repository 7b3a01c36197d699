//! # Status API
//!
//! A small axum router exposing node health and peer state:
//!
//! - `GET /health` — liveness probe, always `200 ok` while the process runs
//! - `GET /status` — version, network, uptime, peer and address counts
//! - `GET /peers`  — the authorities of every connected channel
//!
//! The API is read-only. Anything that mutates the node goes through
//! signals or configuration, not HTTP.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use axon_network::p2p::{NetworkContext, P2p};

use crate::metrics::SharedMetrics;

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Node version string, assembled at startup.
    pub version: String,
    /// Friendly network name (mainnet/testnet/devnet).
    pub network: String,
    /// When the node came up.
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// The network façade.
    pub p2p: Arc<P2p>,
    /// Metrics handles, for the gauges the handlers refresh.
    pub metrics: SharedMetrics,
}

/// Builds the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/peers", get(peers))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Response body for `GET /status`.
#[derive(Debug, Serialize)]
struct StatusResponse {
    version: String,
    network: String,
    uptime_seconds: i64,
    connected_peers: usize,
    known_addresses: usize,
    closed: bool,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let connected = state.p2p.connected_count().await;
    let addresses = state.p2p.address_count().await;

    // Keep the gauges honest on every scrape-adjacent read.
    state.metrics.connected_peers.set(connected as i64);
    state.metrics.known_addresses.set(addresses as i64);

    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        uptime_seconds: (chrono::Utc::now() - state.started_at).num_seconds(),
        connected_peers: connected,
        known_addresses: addresses,
        closed: state.p2p.closed(),
    })
}

/// Response body for `GET /peers`.
#[derive(Debug, Serialize)]
struct PeersResponse {
    count: usize,
    peers: Vec<String>,
}

async fn peers(State(state): State<AppState>) -> Json<PeersResponse> {
    let peers: Vec<String> = state
        .p2p
        .connected()
        .into_iter()
        .map(|authority| authority.to_string())
        .collect();

    Json(PeersResponse {
        count: peers.len(),
        peers,
    })
}
