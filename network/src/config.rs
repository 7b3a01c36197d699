//! # Protocol Constants & Network Settings
//!
//! Every magic number in the Axon network layer lives here. Constants define
//! the wire identity of the network; [`NetworkSettings`] is the per-node
//! snapshot of tunables that sessions, acceptors, and connectors read.
//!
//! Settings are captured once at session construction. A session never sees
//! a live-reloaded value mid-registration — that is a feature, not a gap.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::authority::Authority;

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Mainnet wire magic. Every message preamble starts with these 4 bytes so
/// peers can drop foreign traffic before parsing anything else.
pub const MAGIC_MAINNET: u32 = 0x4158_4F4E; // "AXON"

/// Testnet wire magic.
pub const MAGIC_TESTNET: u32 = 0x4158_4F54; // "AXOT"

/// Devnet wire magic. Reset at will, promises void.
pub const MAGIC_DEVNET: u32 = 0x4158_4F44; // "AXOD"

// ---------------------------------------------------------------------------
// Protocol Versions
// ---------------------------------------------------------------------------

/// The protocol version this node speaks in its own `version` message.
pub const PROTOCOL_VERSION_CURRENT: u32 = 70_002;

/// The lowest peer protocol version we will keep a channel open for.
/// Peers announcing anything below this are rejected during registration.
pub const PROTOCOL_VERSION_MINIMUM: u32 = 70_001;

/// User agent advertised in the `version` handshake, bitcoin-style
/// slash-delimited.
pub const USER_AGENT: &str = "/axon:0.1.0/";

/// Service bits advertised in the `version` handshake. Bit 0 = full relay.
pub const SERVICES_NODE_NETWORK: u64 = 1;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Default P2P listening port.
pub const DEFAULT_P2P_PORT: u16 = 9777;

/// Default status/RPC API port.
pub const DEFAULT_RPC_PORT: u16 = 9778;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9779;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// How long a dial attempt may take before the connector gives up.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the version handshake may take end to end. Generous: a peer on
/// the other side of the planet with a cold socket still fits comfortably.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on simultaneously connected inbound peers.
pub const DEFAULT_INBOUND_LIMIT: usize = 64;

/// Default number of outbound connections the node maintains.
pub const DEFAULT_OUTBOUND_COUNT: usize = 8;

// ---------------------------------------------------------------------------
// Settings Snapshot
// ---------------------------------------------------------------------------

/// Tunable network parameters, captured by each session at construction.
///
/// The defaults describe a devnet node that accepts inbound connections and
/// dials a handful of peers. Production deployments override these from the
/// CLI or environment — see the `axon-node` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Wire magic identifying the network this node participates in.
    pub identifier: u32,

    /// Port the acceptor binds for inbound peers.
    pub inbound_port: u16,

    /// Maximum number of inbound channels held at once.
    pub inbound_limit: usize,

    /// Number of outbound channels the node tries to keep established.
    pub outbound_count: usize,

    /// Deadline for a single dial attempt.
    pub connect_timeout: Duration,

    /// Deadline for the full version handshake on a new channel.
    pub handshake_timeout: Duration,

    /// Lowest peer protocol version accepted during registration.
    pub peer_minimum_version: u32,

    /// User agent string sent in our `version` message.
    pub user_agent: String,

    /// Service bits sent in our `version` message.
    pub services: u64,

    /// Whether we ask peers to relay transactions to us.
    pub relay_transactions: bool,

    /// Peers to dial at startup, before address discovery kicks in.
    pub peers: Vec<Authority>,

    /// Authorities this node refuses to talk to, inbound or outbound.
    pub blacklists: Vec<Authority>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            identifier: MAGIC_DEVNET,
            inbound_port: DEFAULT_P2P_PORT,
            inbound_limit: DEFAULT_INBOUND_LIMIT,
            outbound_count: DEFAULT_OUTBOUND_COUNT,
            connect_timeout: CONNECT_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            peer_minimum_version: PROTOCOL_VERSION_MINIMUM,
            user_agent: USER_AGENT.to_string(),
            services: SERVICES_NODE_NETWORK,
            relay_transactions: true,
            peers: Vec::new(),
            blacklists: Vec::new(),
        }
    }
}

/// Returns a friendly name for a wire magic, mainly for logging. Unknown
/// magics get a hex dump rather than a guess.
pub fn network_name(identifier: u32) -> String {
    match identifier {
        MAGIC_MAINNET => "mainnet".to_string(),
        MAGIC_TESTNET => "testnet".to_string(),
        MAGIC_DEVNET => "devnet".to_string(),
        other => format!("unknown(0x{:08X})", other),
    }
}
