// Copyright (c) 2026 Axon Labs. MIT License.
// See LICENSE for details.

//! # Axon Node
//!
//! Entry point for the `axon-node` binary. Parses CLI arguments, builds the
//! network settings snapshot, brings up the network façade and sessions,
//! runs the inbound accept loop and the outbound dial loop, and serves the
//! status API and Prometheus metrics until a shutdown signal lands.
//!
//! Both connection loops feed accepted streams through a [`TcpChannel`] into
//! session registration, so every channel this node holds went through the
//! full start → handshake → policy → peer-store pipeline.
//!
//! Three subcommands:
//!
//! - `run`     — start the node
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::signal;

use axon_network::channel::ChannelRef;
use axon_network::config::{self, NetworkSettings};
use axon_network::error::NetworkError;
use axon_network::p2p::{NetworkContext, P2p};
use axon_network::session::Session;

use cli::{AxonNodeCli, Commands};
use metrics::NodeMetrics;
use transport::TcpChannel;

/// Pause between outbound dial attempts, successful or not. Keeps a node
/// with one dead seed from spinning on it.
const DIAL_RETRY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AxonNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Builds the settings snapshot from CLI arguments.
fn build_settings(args: &cli::RunArgs) -> Result<NetworkSettings> {
    let identifier = match args.network.as_str() {
        "mainnet" => config::MAGIC_MAINNET,
        "testnet" => config::MAGIC_TESTNET,
        "devnet" => config::MAGIC_DEVNET,
        other => return Err(anyhow!("unknown network {:?}", other)),
    };

    Ok(NetworkSettings {
        identifier,
        inbound_port: args.p2p_port,
        inbound_limit: args.inbound_limit,
        outbound_count: args.outbound_count,
        peer_minimum_version: args.min_peer_version,
        peers: cli::parse_authorities(&args.peers).map_err(|e| anyhow!(e))?,
        blacklists: cli::parse_authorities(&args.blacklists).map_err(|e| anyhow!(e))?,
        ..NetworkSettings::default()
    })
}

/// Drives one channel through session registration and keeps the channel
/// metrics honest about the outcome.
async fn register_and_track(
    session: Arc<Session>,
    channel: ChannelRef,
    metrics: Arc<NodeMetrics>,
) {
    let authority = channel.authority();

    let stopped_metrics = Arc::clone(&metrics);
    let result = session
        .register_channel(channel, move |code| {
            stopped_metrics.connected_peers.dec();
            tracing::debug!(peer = %authority, %code, "channel stopped");
        })
        .await;

    match result {
        Ok(()) => {
            metrics.channels_accepted_total.inc();
            metrics.connected_peers.inc();
            tracing::info!(peer = %authority, "channel registered");
        }
        Err(NetworkError::ServiceStopped) => {
            tracing::debug!(peer = %authority, "registration abandoned by shutdown");
        }
        Err(
            code @ (NetworkError::AcceptFailed
            | NetworkError::AddressBlocked
            | NetworkError::AddressInUse),
        ) => {
            metrics.channels_rejected_total.inc();
            tracing::debug!(peer = %authority, %code, "channel rejected");
        }
        Err(code) => {
            metrics.handshake_failures_total.inc();
            tracing::debug!(peer = %authority, %code, "handshake failed");
        }
    }
}

/// Starts the full node: façade, sessions, connection loops, API, and
/// metrics.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init(&args.log_level, args.log_json);

    let settings = build_settings(&args)?;
    let magic = settings.identifier;
    tracing::info!(
        network = %config::network_name(magic),
        p2p_port = settings.inbound_port,
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        seeds = settings.peers.len(),
        "starting axon-node"
    );

    // --- Network façade and sessions ---
    let p2p = P2p::new(settings.clone());
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics
        .known_addresses
        .set(p2p.address_count().await as i64);

    let inbound = Arc::new(Session::inbound(
        Arc::clone(&p2p) as Arc<dyn NetworkContext>
    ));
    inbound
        .start()
        .map_err(|e| anyhow!("inbound session failed to start: {}", e))?;

    let outbound = Arc::new(Session::outbound(
        Arc::clone(&p2p) as Arc<dyn NetworkContext>
    ));
    outbound
        .start()
        .map_err(|e| anyhow!("outbound session failed to start: {}", e))?;

    // --- Inbound accept loop ---
    let acceptor = inbound.create_acceptor();
    acceptor
        .listen()
        .await
        .map_err(|e| anyhow!("failed to bind p2p port: {}", e))?;

    let accept_loop = {
        let session = Arc::clone(&inbound);
        let metrics = Arc::clone(&node_metrics);
        tokio::spawn(async move {
            loop {
                match acceptor.accept().await {
                    Ok((stream, authority)) => {
                        metrics.inbound_connections_total.inc();

                        if session.blacklisted(&authority) {
                            metrics.channels_rejected_total.inc();
                            tracing::debug!(peer = %authority, "dropped blacklisted peer");
                            continue;
                        }

                        tracing::info!(peer = %authority, "inbound connection accepted");
                        let channel = TcpChannel::new(stream, authority, magic);
                        let session = Arc::clone(&session);
                        let metrics = Arc::clone(&metrics);
                        tokio::spawn(register_and_track(
                            session,
                            channel as ChannelRef,
                            metrics,
                        ));
                    }
                    Err(e) if e.is_shutdown() => {
                        tracing::info!("accept loop stopped");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("accept failure: {}", e);
                    }
                }
            }
        })
    };

    // --- Outbound dial loop ---
    // Draws addresses from the host list (seeded by --peer) until the
    // outbound target is met; every established stream goes through the
    // same registration pipeline as an accepted one.
    let connector = outbound.create_connector();
    let dial_loop = {
        let session = Arc::clone(&outbound);
        let network = Arc::clone(&p2p);
        let metrics = Arc::clone(&node_metrics);
        let outbound_target = settings.outbound_count;
        tokio::spawn(async move {
            loop {
                if session.stopped() {
                    tracing::info!("dial loop stopped");
                    break;
                }

                if session.connection_count().await >= outbound_target {
                    tokio::time::sleep(DIAL_RETRY_DELAY).await;
                    continue;
                }

                let address = match session.fetch_address().await {
                    Ok(address) => address,
                    Err(_) => {
                        // Nothing to dial yet; the host list fills as peers
                        // are configured or relayed.
                        tokio::time::sleep(DIAL_RETRY_DELAY).await;
                        continue;
                    }
                };

                if session.blacklisted(&address) || network.connected().contains(&address) {
                    tokio::time::sleep(DIAL_RETRY_DELAY).await;
                    continue;
                }

                match connector.connect(&address).await {
                    Ok(stream) => {
                        tracing::info!(peer = %address, "outbound connection established");
                        let channel = TcpChannel::new(stream, address, magic);
                        let session = Arc::clone(&session);
                        let metrics = Arc::clone(&metrics);
                        tokio::spawn(register_and_track(
                            session,
                            channel as ChannelRef,
                            metrics,
                        ));
                    }
                    Err(e) if e.is_shutdown() => {
                        tracing::info!("dial loop stopped");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(peer = %address, "dial failed: {}", e);
                    }
                }

                tokio::time::sleep(DIAL_RETRY_DELAY).await;
            }
        })
    };

    // --- Status API ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            config::PROTOCOL_VERSION_CURRENT,
        ),
        network: config::network_name(magic),
        started_at: chrono::Utc::now(),
        p2p: Arc::clone(&p2p),
        metrics: Arc::clone(&node_metrics),
    };
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("status API listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("metrics listening on {}", metrics_addr);

    // --- Serve until shutdown ---
    tokio::select! {
        served = async { axum::serve(api_listener, api_router).await } => {
            if let Err(e) = served {
                tracing::error!("API server error: {}", e);
            }
        }
        served = async { axum::serve(metrics_listener, metrics_router).await } => {
            if let Err(e) = served {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    // Fire the network stop: sessions stop admitting registrations, the
    // acceptor and connector release their blocked I/O, channels wind down.
    p2p.close();
    let _ = accept_loop.await;
    dial_loop.abort();
    tracing::info!("axon-node stopped");
    Ok(())
}

/// Queries a running node's status endpoint and prints the body.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(&args.rpc_addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.rpc_addr))?;

    let request = format!(
        "GET /status HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        args.rpc_addr,
    );
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    let response = String::from_utf8_lossy(&response);

    // Everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or(&response);
    println!("{}", body.trim());
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("axon-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", config::PROTOCOL_VERSION_CURRENT);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
