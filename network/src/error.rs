//! Error types for the Axon network core.
//!
//! Every fallible operation in this crate returns a [`NetworkError`]. The
//! enum is flat on purpose: subscribers carry these values across task
//! boundaries, so they must be cheap to clone and comparable in tests.
//! Success is the `Ok` arm of `Result` — there is no "no error" variant.

use thiserror::Error;

/// Errors produced by the session, hub, and channel machinery.
///
/// Decoder- and transport-originated failures are forwarded verbatim in
/// their message-carrying variants; the core never reclassifies them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The operation was attempted against a stopped component.
    #[error("service is stopped")]
    ServiceStopped,

    /// A precondition was violated (e.g., starting a started session).
    #[error("operation failed")]
    OperationFailed,

    /// The requested object does not exist (unknown message kind,
    /// missing pending entry, absent channel).
    #[error("object does not exist")]
    NotFound,

    /// The channel was rejected by policy: loopback, version below the
    /// configured minimum, or the peer store refused it.
    #[error("connection acceptance failed")]
    AcceptFailed,

    /// The peer authority is on the configured blacklist.
    #[error("address is blocked")]
    AddressBlocked,

    /// A channel for this authority is already registered.
    #[error("address already in use")]
    AddressInUse,

    /// A channel operation did not complete within its deadline.
    #[error("channel timed out")]
    ChannelTimeout,

    /// A payload failed to decode from its byte stream.
    #[error("malformed payload: {0}")]
    BadStream(String),

    /// The underlying transport reported a failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl NetworkError {
    /// True for the codes a stopped component hands to its waiters.
    ///
    /// Useful for callers that treat shutdown as the quiet path and
    /// everything else as noteworthy.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, NetworkError::ServiceStopped)
    }
}
