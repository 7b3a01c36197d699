//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped from `/metrics` on the
//! configured metrics port. All metrics live in a dedicated registry under
//! the `axon` namespace so nothing collides with default-registry users.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Cheap to clone (prometheus handles are `Arc` internally) and shared
/// between the accept loop and the HTTP handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Registry owning everything below.
    registry: Registry,
    /// Currently connected P2P channels.
    pub connected_peers: IntGauge,
    /// Inbound connections accepted off the socket, before any screening.
    pub inbound_connections_total: IntCounter,
    /// Channels that completed registration.
    pub channels_accepted_total: IntCounter,
    /// Channels rejected by policy (blacklist, loopback, version floor).
    pub channels_rejected_total: IntCounter,
    /// Registrations that failed in the version handshake.
    pub handshake_failures_total: IntCounter,
    /// Addresses currently in the host list.
    pub known_addresses: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("axon".into()), None)
            .expect("failed to create prometheus registry");

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let metric = IntCounter::new(name, help).expect("metric creation");
            registry
                .register(Box::new(metric.clone()))
                .expect("metric registration");
            metric
        }

        fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
            let metric = IntGauge::new(name, help).expect("metric creation");
            registry
                .register(Box::new(metric.clone()))
                .expect("metric registration");
            metric
        }

        Self {
            connected_peers: gauge(
                &registry,
                "connected_peers",
                "Number of currently connected P2P channels",
            ),
            inbound_connections_total: counter(
                &registry,
                "inbound_connections_total",
                "Inbound connections accepted off the socket",
            ),
            channels_accepted_total: counter(
                &registry,
                "channels_accepted_total",
                "Channels that completed registration",
            ),
            channels_rejected_total: counter(
                &registry,
                "channels_rejected_total",
                "Channels rejected by registration policy",
            ),
            handshake_failures_total: counter(
                &registry,
                "handshake_failures_total",
                "Registrations that failed during the version handshake",
            ),
            known_addresses: gauge(
                &registry,
                "known_addresses",
                "Addresses currently in the host list",
            ),
            registry,
        }
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics handle for axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler rendering `/metrics`.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
