//! # Channel Contract
//!
//! A [`Channel`] is an established peer connection plus its protocol state:
//! the session's view of "one peer". The concrete implementation lives in
//! the transport layer (it owns the socket and the byte-level codec); this
//! trait pins down exactly what the session, the pending table, and the
//! version protocol are allowed to observe and drive.
//!
//! Every channel owns its own [`MessageHub`]: the transport demultiplexes
//! incoming `(kind, bytes)` pairs into it, and protocol code awaits typed
//! messages from it. That is what makes the handshake expressible without
//! the session ever touching bytes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::authority::Authority;
use crate::error::NetworkError;
use crate::hub::MessageHub;
use crate::message::{Payload, Version};

/// Shared handle to a channel.
pub type ChannelRef = Arc<dyn Channel>;

/// An owning handle to one peer connection.
///
/// `nonce`, `notify`, and `version` are plain mutable attributes: the
/// session writes them at well-defined points of the registration pipeline
/// and nothing else touches them.
#[async_trait]
pub trait Channel: Send + Sync {
    /// The peer's network identity.
    fn authority(&self) -> Authority;

    /// The connection nonce for loopback detection; zero when not pending.
    fn nonce(&self) -> u64;

    /// Sets the connection nonce.
    fn set_nonce(&self, nonce: u64);

    /// Sets the peer-store notification hint carried by this channel.
    fn set_notify(&self, notify: bool);

    /// The peer's `version` message — populated only after a successful
    /// handshake.
    fn version(&self) -> Option<Version>;

    /// Records the peer's `version` message.
    fn set_version(&self, version: Version);

    /// The channel's message hub.
    fn hub(&self) -> &MessageHub;

    /// Sends a message to the peer.
    async fn send(&self, payload: Payload) -> Result<(), NetworkError>;

    /// Starts the channel's I/O (read cycle, timers). Completes when the
    /// channel is live or has failed to come up.
    async fn start(&self) -> Result<(), NetworkError>;

    /// Stops the channel with a reason code, releasing its I/O.
    fn stop(&self, reason: NetworkError);

    /// Registers a stop waiter. Fires exactly once, with the code the
    /// channel stopped for; subscribing after the stop completes
    /// immediately with that code.
    fn subscribe_stop(&self) -> oneshot::Receiver<NetworkError>;
}
