//! # Network Façade
//!
//! [`NetworkContext`] is the seam between sessions and the network instance
//! that owns them: the settings snapshot, the shared pending table, the
//! network-wide stop signal, the connected-peer store, and the address book
//! queries. Sessions only ever talk to this trait.
//!
//! [`P2p`] is the concrete façade. Its peer store is a plain
//! authority-keyed map and its address book a seeded host list — enough to
//! run a node skeleton and the integration suite; richer stores implement
//! the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::authority::Authority;
use crate::channel::{Channel, ChannelRef};
use crate::config::NetworkSettings;
use crate::error::NetworkError;
use crate::pending::PendingTable;
use crate::subscriber::StopDispatcher;

/// The network instance as seen by its sessions.
#[async_trait]
pub trait NetworkContext: Send + Sync {
    /// The settings snapshot sessions copy at construction.
    fn settings(&self) -> &NetworkSettings;

    /// The pending-nonce table shared by every outbound session.
    fn pending(&self) -> &PendingTable;

    /// Registers a waiter on the network-wide stop signal. Subscribing is
    /// synchronous; after the signal fires, new waiters complete
    /// immediately.
    fn subscribe_stop(&self) -> oneshot::Receiver<NetworkError>;

    /// Hands a fully registered channel to the peer store.
    async fn store(&self, channel: ChannelRef) -> Result<(), NetworkError>;

    /// Removes a stopped channel from the peer store.
    async fn remove(&self, channel: &dyn Channel) -> Result<(), NetworkError>;

    /// Number of known peer addresses.
    async fn address_count(&self) -> usize;

    /// Picks an address to dial.
    async fn fetch_address(&self) -> Result<Authority, NetworkError>;

    /// Number of currently connected channels.
    async fn connected_count(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Concrete Façade
// ---------------------------------------------------------------------------

/// The concrete network façade: settings, pending table, stop signal,
/// connected-channel map, and a host list seeded from the settings.
pub struct P2p {
    settings: NetworkSettings,
    pending: PendingTable,
    stop: StopDispatcher,
    channels: Mutex<HashMap<Authority, ChannelRef>>,
    hosts: Mutex<Vec<Authority>>,
}

impl P2p {
    /// Creates a façade over a settings snapshot. The host list starts as
    /// the configured seed peers.
    pub fn new(settings: NetworkSettings) -> Arc<Self> {
        let hosts = settings.peers.clone();
        Arc::new(Self {
            settings,
            pending: PendingTable::new(),
            stop: StopDispatcher::new(),
            channels: Mutex::new(HashMap::new()),
            hosts: Mutex::new(hosts),
        })
    }

    /// Fires the network stop signal and stops every connected channel.
    ///
    /// Sessions stop creating connections once the signal lands; channels
    /// already past registration wind down through their own stop path.
    pub fn close(&self) {
        info!("network closing");
        self.stop.fire(NetworkError::ServiceStopped);

        let channels: Vec<ChannelRef> = self.channels.lock().values().cloned().collect();
        for channel in channels {
            channel.stop(NetworkError::ServiceStopped);
        }
    }

    /// True once the stop signal has fired.
    pub fn closed(&self) -> bool {
        self.stop.fired()
    }

    /// The authorities of every currently connected channel.
    pub fn connected(&self) -> Vec<Authority> {
        self.channels.lock().keys().copied().collect()
    }

    /// Adds an address to the host list if it is not already known.
    pub fn add_host(&self, authority: Authority) {
        let mut hosts = self.hosts.lock();
        if !hosts.contains(&authority) {
            hosts.push(authority);
        }
    }
}

#[async_trait]
impl NetworkContext for P2p {
    fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    fn pending(&self) -> &PendingTable {
        &self.pending
    }

    fn subscribe_stop(&self) -> oneshot::Receiver<NetworkError> {
        self.stop.subscribe()
    }

    async fn store(&self, channel: ChannelRef) -> Result<(), NetworkError> {
        if self.stop.fired() {
            return Err(NetworkError::ServiceStopped);
        }

        let authority = channel.authority();
        let mut channels = self.channels.lock();
        if channels.contains_key(&authority) {
            return Err(NetworkError::AddressInUse);
        }
        channels.insert(authority, channel);
        drop(channels);

        debug!(peer = %authority, "channel stored");
        Ok(())
    }

    async fn remove(&self, channel: &dyn Channel) -> Result<(), NetworkError> {
        let authority = channel.authority();
        match self.channels.lock().remove(&authority) {
            Some(_) => {
                debug!(peer = %authority, "channel removed");
                Ok(())
            }
            None => Err(NetworkError::NotFound),
        }
    }

    async fn address_count(&self) -> usize {
        self.hosts.lock().len()
    }

    async fn fetch_address(&self) -> Result<Authority, NetworkError> {
        let hosts = self.hosts.lock();
        if hosts.is_empty() {
            return Err(NetworkError::NotFound);
        }
        let index = rand::thread_rng().gen_range(0..hosts.len());
        Ok(hosts[index])
    }

    async fn connected_count(&self) -> usize {
        self.channels.lock().len()
    }
}
