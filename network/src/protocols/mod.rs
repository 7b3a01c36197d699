//! # Protocol Attachments
//!
//! Protocols are the conversations that run on top of a started channel.
//! The session drives exactly one of them itself — the version handshake,
//! because nothing else may happen on a channel until it completes. Ping
//! keepalive and address relay attach after registration and belong to the
//! layers above; they consume the same [`Handshake`]-style seam shape but
//! are not defined here.

mod version;

pub use version::VersionProtocol;

use async_trait::async_trait;

use crate::channel::ChannelRef;
use crate::error::NetworkError;

/// The version-exchange seam the session runs to completion on every new
/// channel.
///
/// On success the channel's `version()` attribute is populated; on failure
/// the channel is unusable and the session stops it.
#[async_trait]
pub trait Handshake: Send + Sync {
    /// Performs the handshake on `channel`, recording the peer version.
    async fn perform(&self, channel: &ChannelRef) -> Result<(), NetworkError>;
}
