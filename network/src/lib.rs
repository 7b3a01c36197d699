// Copyright (c) 2026 Axon Labs. MIT License.
// See LICENSE for details.

//! # Axon Network — Session & Message Dispatch Core
//!
//! The networking heart of an Axon gossip node: everything between "a TCP
//! stream exists" and "a registered peer is exchanging typed messages".
//!
//! Two subsystems carry the weight:
//!
//! - **The message hub** ([`hub::MessageHub`]) — a typed fan-in/fan-out
//!   multiplexer. The transport reads `(kind, bytes)` off the wire; the hub
//!   decodes against the kind's payload schema and delivers the value (or
//!   the decode error, or a terminal shutdown code) to every waiter parked
//!   on that kind. One subscriber per kind, all started, stopped, and
//!   broadcast together.
//! - **The registration session** ([`session::Session`]) — the state
//!   machine that takes a freshly accepted or dialed channel through
//!   startup, the version handshake, loopback detection against the shared
//!   pending-nonce table, version-floor policy, and peer-store insertion,
//!   with strict rules about when the caller's stop callback is armed.
//!
//! Around them: the pending table ([`pending::PendingTable`]), the
//! stoppable socket resources ([`acceptor::Acceptor`],
//! [`connector::Connector`]), the network façade seam ([`p2p`]), and the
//! wire message types ([`message`]).
//!
//! What this crate deliberately does *not* contain: byte-level channel I/O,
//! message encoding, TLS, the address book, and gossip content validation.
//! Those live behind the [`channel::Channel`] and [`p2p::NetworkContext`]
//! traits.

pub mod acceptor;
pub mod authority;
pub mod channel;
pub mod config;
pub mod connector;
pub mod error;
pub mod hub;
pub mod message;
pub mod p2p;
pub mod pending;
pub mod protocols;
pub mod session;
pub mod subscriber;

pub use acceptor::Acceptor;
pub use authority::Authority;
pub use channel::{Channel, ChannelRef};
pub use config::NetworkSettings;
pub use connector::Connector;
pub use error::NetworkError;
pub use hub::MessageHub;
pub use message::{MessageKind, Payload};
pub use p2p::{NetworkContext, P2p};
pub use pending::PendingTable;
pub use protocols::{Handshake, VersionProtocol};
pub use session::Session;
pub use subscriber::{StopDispatcher, Subscriber};
