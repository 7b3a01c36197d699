//! # CLI Interface
//!
//! Command-line argument structure for `axon-node`, via `clap` derive.
//! Three subcommands: `run`, `status`, and `version`. Every tunable has an
//! environment-variable mirror so container deployments don't need a wall
//! of flags.

use clap::{Parser, Subcommand};

use axon_network::authority::Authority;
use axon_network::config;

/// Axon gossip network node.
///
/// Accepts inbound peers, dials configured seeds, and exposes a status API
/// plus Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "axon-node",
    about = "Axon gossip network node",
    version,
    propagate_version = true
)]
pub struct AxonNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Query the status endpoint of a running node.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Network to join: mainnet, testnet, or devnet.
    #[arg(long, env = "AXON_NETWORK", default_value = "devnet")]
    pub network: String,

    /// Port the P2P acceptor binds.
    #[arg(long, env = "AXON_P2P_PORT", default_value_t = config::DEFAULT_P2P_PORT)]
    pub p2p_port: u16,

    /// Port for the status/RPC API.
    #[arg(long, env = "AXON_RPC_PORT", default_value_t = config::DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "AXON_METRICS_PORT", default_value_t = config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Seed peer to dial at startup (`ip:port`). Repeatable.
    #[arg(long = "peer", env = "AXON_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Peer authority to refuse all traffic from (`ip:port`). Repeatable.
    #[arg(long = "blacklist", env = "AXON_BLACKLISTS", value_delimiter = ',')]
    pub blacklists: Vec<String>,

    /// Lowest peer protocol version to accept.
    #[arg(long, env = "AXON_MIN_PEER_VERSION",
          default_value_t = config::PROTOCOL_VERSION_MINIMUM)]
    pub min_peer_version: u32,

    /// Maximum simultaneous inbound peers.
    #[arg(long, env = "AXON_INBOUND_LIMIT",
          default_value_t = config::DEFAULT_INBOUND_LIMIT)]
    pub inbound_limit: usize,

    /// Outbound connections to maintain.
    #[arg(long, env = "AXON_OUTBOUND_COUNT",
          default_value_t = config::DEFAULT_OUTBOUND_COUNT)]
    pub outbound_count: usize,

    /// Log verbosity: trace, debug, info, warn, error.
    #[arg(long, env = "AXON_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines instead of pretty text.
    #[arg(long, env = "AXON_LOG_JSON")]
    pub log_json: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    /// Address of the running node's RPC endpoint (`host:port`).
    #[arg(long, default_value = "127.0.0.1:9778")]
    pub rpc_addr: String,
}

/// Parses `ip:port` strings into authorities, reporting the offender on
/// failure.
pub fn parse_authorities(values: &[String]) -> Result<Vec<Authority>, String> {
    values
        .iter()
        .map(|value| {
            value
                .parse::<Authority>()
                .map_err(|_| format!("not an ip:port pair: {:?}", value))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
