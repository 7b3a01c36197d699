//! # Channel Registration Session
//!
//! A [`Session`] converts raw channels into registered, protocol-attached
//! peers. It owns the policy for one connection-establishment style —
//! inbound accepts versus outbound dials, persistent versus transient — and
//! drives every new channel through the same pipeline:
//!
//! ```text
//! register_channel
//!   ├─ outbound: assign notify + nonzero nonce, pend the channel
//!   ├─ start channel I/O
//!   ├─ run the version handshake
//!   ├─ inbound: reject if the peer's nonce matches a pending dial (loopback)
//!   ├─ reject peers below the minimum protocol version
//!   ├─ hand the channel to the peer store
//!   └─ arm the caller's stop callback   ← only on success
//! ```
//!
//! Outbound channels are unpended and their nonce zeroed before the caller
//! learns the outcome, success or not. A channel that fails anywhere in the
//! pipeline is stopped with the failing code and its stop callback is never
//! armed — the code reaches the caller exclusively through the
//! registration result.
//!
//! Stopping is soft: the session stops admitting new registrations the
//! moment the network stop signal lands, but in-flight registrations run to
//! their natural end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::acceptor::Acceptor;
use crate::authority::Authority;
use crate::channel::ChannelRef;
use crate::config::NetworkSettings;
use crate::connector::Connector;
use crate::error::NetworkError;
use crate::p2p::NetworkContext;
use crate::protocols::{Handshake, VersionProtocol};

/// A nonzero pseudo-random nonce for an outbound dial.
fn nonzero_nonce() -> u64 {
    rand::thread_rng().gen_range(1..=u64::MAX)
}

/// A channel registration session.
///
/// Construct one per connection-establishment policy, `start` it once, then
/// feed it channels. The session holds no channel state of its own — the
/// shared pending table and the stop flag are the only mutables it touches,
/// so concurrent registrations are independent.
pub struct Session {
    network: Arc<dyn NetworkContext>,
    handshake: Arc<dyn Handshake>,
    settings: NetworkSettings,
    stopped: Arc<AtomicBool>,
    incoming: bool,
    notify: bool,
}

impl Session {
    /// Creates a session. `incoming` selects the inbound pipeline (loopback
    /// check, no pending entry); `persistent` marks channels so the peer
    /// store notifies downstream consumers when one finally joins.
    pub fn new(network: Arc<dyn NetworkContext>, incoming: bool, persistent: bool) -> Self {
        let settings = network.settings().clone();
        let handshake: Arc<dyn Handshake> = Arc::new(VersionProtocol::new(settings.clone()));
        Self {
            network,
            handshake,
            settings,
            stopped: Arc::new(AtomicBool::new(true)),
            incoming,
            notify: persistent,
        }
    }

    /// An inbound session: accepts handed over by the acceptor.
    pub fn inbound(network: Arc<dyn NetworkContext>) -> Self {
        Self::new(network, true, true)
    }

    /// An outbound session: dials made through the connector.
    pub fn outbound(network: Arc<dyn NetworkContext>) -> Self {
        Self::new(network, false, true)
    }

    /// Replaces the handshake implementation. Tests and experimental
    /// protocol variants hook in here; production code keeps the default.
    pub fn with_handshake(mut self, handshake: Arc<dyn Handshake>) -> Self {
        self.handshake = handshake;
        self
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts the session.
    ///
    /// Fails with `OperationFailed` when already started. The network stop
    /// subscription is installed before this returns, so a stop signal
    /// fired immediately after a successful `start` is never missed.
    pub fn start(&self) -> Result<(), NetworkError> {
        if !self.stopped() {
            return Err(NetworkError::OperationFailed);
        }
        self.stopped.store(false, Ordering::SeqCst);

        let stop_rx = self.network.subscribe_stop();
        let stopped = Arc::clone(&self.stopped);
        tokio::spawn(async move {
            let _ = stop_rx.await;
            // Stop admitting registrations; in-flight ones run to the end.
            stopped.store(true, Ordering::SeqCst);
        });

        Ok(())
    }

    /// True before `start` and after the network stop signal lands.
    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// True when `authority` is on the configured blacklist.
    pub fn blacklisted(&self, authority: &Authority) -> bool {
        self.settings.blacklists.contains(authority)
    }

    // -----------------------------------------------------------------------
    // Socket creators
    // -----------------------------------------------------------------------
    // The spawned stop watchers capture only the resource handle; nothing
    // here outlives the session through them.

    /// Creates an acceptor whose I/O is released when the network stops.
    pub fn create_acceptor(&self) -> Arc<Acceptor> {
        let acceptor = Arc::new(Acceptor::new(self.settings.clone()));

        let stop_rx = self.network.subscribe_stop();
        let handle = Arc::clone(&acceptor);
        tokio::spawn(async move {
            let _ = stop_rx.await;
            handle.stop();
        });

        acceptor
    }

    /// Creates a connector whose I/O is released when the network stops.
    pub fn create_connector(&self) -> Arc<Connector> {
        let connector = Arc::new(Connector::new(self.settings.clone()));

        let stop_rx = self.network.subscribe_stop();
        let handle = Arc::clone(&connector);
        tokio::spawn(async move {
            let _ = stop_rx.await;
            handle.stop();
        });

        connector
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Drives `channel` through startup, handshake, policy checks, and
    /// peer-store insertion.
    ///
    /// The returned result is the registration outcome. On success — and
    /// only on success — `on_stopped` is armed and will fire exactly once
    /// when the channel later stops, after the channel has been removed
    /// from the peer store. On failure the channel is stopped with the
    /// failing code and `on_stopped` is dropped unused.
    pub async fn register_channel<F>(
        &self,
        channel: ChannelRef,
        on_stopped: F,
    ) -> Result<(), NetworkError>
    where
        F: FnOnce(NetworkError) + Send + 'static,
    {
        match self.start_channel(&channel).await {
            Ok(()) => {
                self.arm_stop_subscription(&channel, on_stopped);
                Ok(())
            }
            Err(code) => {
                channel.stop(code.clone());
                Err(code)
            }
        }
    }

    /// The registration pipeline minus the terminal stop/arm step.
    async fn start_channel(&self, channel: &ChannelRef) -> Result<(), NetworkError> {
        if self.stopped() {
            return Err(NetworkError::ServiceStopped);
        }

        if self.incoming {
            return self.run_startup(channel).await;
        }

        // Outbound: pend the dial so the remote side of a self-connection
        // can be recognized by its nonce.
        channel.set_notify(self.notify);
        channel.set_nonce(nonzero_nonce());

        let result = match self.network.pending().store(Arc::clone(channel)) {
            Ok(()) => self.run_startup(channel).await,
            Err(code) => Err(code),
        };

        // Unpend and zero the nonce before the caller learns the outcome.
        let nonce = channel.nonce();
        if let Err(code) = self.network.pending().remove(nonce) {
            debug!(peer = %channel.authority(), %code, "failed to unpend channel");
        }
        channel.set_nonce(0);

        result
    }

    /// Start → handshake → loopback/version gates → peer store.
    async fn run_startup(&self, channel: &ChannelRef) -> Result<(), NetworkError> {
        channel.start().await?;

        if let Err(code) = self.handshake.perform(channel).await {
            debug!(
                peer = %channel.authority(),
                %code,
                "failure in handshake"
            );
            return Err(code);
        }

        // The handshake populates the version; its absence here would mean
        // a broken handshake implementation.
        let version = channel.version().ok_or(NetworkError::AcceptFailed)?;

        // The loopback test is for incoming channels only: an outbound
        // dial's own nonce is in the table while we sit here.
        if self.incoming && self.network.pending().exists(version.nonce) {
            debug!(peer = %channel.authority(), "rejected loopback connection");
            return Err(NetworkError::AcceptFailed);
        }

        if version.value < self.settings.peer_minimum_version {
            debug!(
                peer = %channel.authority(),
                version = version.value,
                minimum = self.settings.peer_minimum_version,
                "peer version below minimum"
            );
            return Err(NetworkError::AcceptFailed);
        }

        self.network.store(Arc::clone(channel)).await
    }

    /// Subscribes `on_stopped` to the channel's stop signal. Installed
    /// synchronously, before registration success is reported, so no stop
    /// event can fall between the two. The watcher also evicts the channel
    /// from the peer store — best-effort, like all stop-path bookkeeping.
    fn arm_stop_subscription<F>(&self, channel: &ChannelRef, on_stopped: F)
    where
        F: FnOnce(NetworkError) + Send + 'static,
    {
        let stop_rx = channel.subscribe_stop();
        let network = Arc::clone(&self.network);
        let channel = Arc::clone(channel);

        tokio::spawn(async move {
            let code = stop_rx.await.unwrap_or(NetworkError::ServiceStopped);

            if let Err(remove_code) = network.remove(channel.as_ref()).await {
                debug!(
                    peer = %channel.authority(),
                    code = %remove_code,
                    "failed to remove channel"
                );
            }

            on_stopped(code);
        });
    }

    // -----------------------------------------------------------------------
    // Façade delegations
    // -----------------------------------------------------------------------

    /// Number of known peer addresses.
    pub async fn address_count(&self) -> usize {
        self.network.address_count().await
    }

    /// Picks an address to dial.
    pub async fn fetch_address(&self) -> Result<Authority, NetworkError> {
        self.network.fetch_address().await
    }

    /// Number of currently connected channels.
    pub async fn connection_count(&self) -> usize {
        self.network.connected_count().await
    }
}
