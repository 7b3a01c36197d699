//! Version handshake protocol.
//!
//! The opening exchange on every channel: both sides send `version`, record
//! what the peer sent, and acknowledge with `verack`. Until both the peer
//! `version` and its `verack` have arrived, the channel carries no other
//! traffic.
//!
//! The exchange rides the channel's own message hub — this protocol never
//! sees bytes, only decoded payloads. The whole conversation runs under the
//! configured handshake deadline.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;

use crate::channel::ChannelRef;
use crate::config::{NetworkSettings, PROTOCOL_VERSION_CURRENT};
use crate::error::NetworkError;
use crate::message::{NetworkAddress, Payload, Verack, Version};
use crate::protocols::Handshake;
use crate::subscriber::DeliveryReceiver;

/// The concrete version-exchange implementation.
pub struct VersionProtocol {
    settings: NetworkSettings,
}

impl VersionProtocol {
    /// Creates the protocol over a settings snapshot.
    pub fn new(settings: NetworkSettings) -> Self {
        Self { settings }
    }

    /// Builds our own `version` message for `channel`. The channel nonce is
    /// whatever the session assigned: nonzero for outbound dials (so the
    /// remote side can detect loopback), zero for inbound.
    fn local_version(&self, channel: &ChannelRef) -> Version {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Version {
            value: PROTOCOL_VERSION_CURRENT,
            services: self.settings.services,
            timestamp,
            address_receiver: NetworkAddress::from_authority(&channel.authority(), 0),
            address_sender: NetworkAddress::unspecified(),
            nonce: channel.nonce(),
            user_agent: self.settings.user_agent.clone(),
            start_height: 0,
            relay: self.settings.relay_transactions,
        }
    }
}

/// Awaits one delivery from the hub, mapping a dropped hub to
/// `ServiceStopped` and unwrapping the relayed code.
async fn expect<T>(receiver: DeliveryReceiver<T>) -> Result<T, NetworkError> {
    receiver
        .await
        .unwrap_or(Err(NetworkError::ServiceStopped))
}

#[async_trait]
impl Handshake for VersionProtocol {
    async fn perform(&self, channel: &ChannelRef) -> Result<(), NetworkError> {
        // Subscribe before sending anything: a peer that answers faster
        // than we park would otherwise slip past us.
        let version_rx = channel.hub().subscribe_version();
        let verack_rx = channel.hub().subscribe_verack();

        let exchange = async {
            channel
                .send(Payload::Version(self.local_version(channel)))
                .await?;

            let peer_version = expect(version_rx).await?;
            channel.set_version(peer_version.clone());

            channel.send(Payload::Verack(Verack)).await?;
            expect(verack_rx).await?;

            Ok::<Version, NetworkError>(peer_version)
        };

        let peer_version = timeout(self.settings.handshake_timeout, exchange)
            .await
            .map_err(|_| NetworkError::ChannelTimeout)??;

        debug!(
            peer = %channel.authority(),
            version = peer_version.value,
            agent = %peer_version.user_agent,
            "handshake complete"
        );
        Ok(())
    }
}
