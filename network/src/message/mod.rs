//! # Wire Messages
//!
//! The closed set of message kinds this network speaks, their payload
//! types, and the checked byte reader the decoders run on.
//!
//! [`MessageKind`] is the demultiplexing key: the transport reads a command
//! string off the wire, maps it to a kind, and hands `(kind, payload bytes)`
//! to the message hub. [`Payload`] is the tagged union of every decoded
//! payload, used where a message must travel as one value (e.g., across the
//! channel send seam).
//!
//! Decoding is deterministic and total: any byte slice either decodes or
//! yields [`BadStream`](crate::error::NetworkError::BadStream). Encoding is
//! the external codec's concern and does not appear in this crate.

mod payloads;
mod reader;

pub use payloads::{
    Address, Alert, Block, BlockHeader, FilterAdd, FilterClear, FilterLoad, GetAddress, GetBlocks,
    GetData, GetHeaders, Headers, Inventory, InventoryType, InventoryVector, MemoryPool,
    MerkleBlock, NetworkAddress, NotFound, OutPoint, Ping, Pong, Reject, TimestampedAddress,
    Transaction, TxInput, TxOutput, Verack, Version,
};
pub use reader::ByteReader;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Deterministic decode from a byte stream.
pub trait Decode: Sized {
    /// Decodes one value, consuming exactly the bytes it needs.
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError>;
}

// ---------------------------------------------------------------------------
// Message Kinds
// ---------------------------------------------------------------------------

/// The closed enumeration of wire message kinds.
///
/// `Unknown` is the sentinel for command strings we do not recognize; it has
/// no payload type and the hub answers it with `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// `addr` — peer address relay.
    Address,
    /// `alert` — signed network notice.
    Alert,
    /// `block` — full block.
    Block,
    /// `filteradd` — bloom filter element insert.
    FilterAdd,
    /// `filterclear` — bloom filter reset.
    FilterClear,
    /// `filterload` — bloom filter install.
    FilterLoad,
    /// `getaddr` — address request.
    GetAddress,
    /// `getblocks` — block inventory request.
    GetBlocks,
    /// `getdata` — object request.
    GetData,
    /// `getheaders` — header request.
    GetHeaders,
    /// `headers` — header batch.
    Headers,
    /// `inv` — object announcement.
    Inventory,
    /// `mempool` — mempool announcement request.
    MemoryPool,
    /// `merkleblock` — filtered block.
    MerkleBlock,
    /// `notfound` — negative object response.
    NotFound,
    /// `ping` — keepalive probe.
    Ping,
    /// `pong` — keepalive reply.
    Pong,
    /// `reject` — message refusal.
    Reject,
    /// `tx` — transaction.
    Transaction,
    /// `verack` — version acknowledgment.
    Verack,
    /// `version` — handshake opener.
    Version,
    /// Anything we do not recognize.
    Unknown,
}

impl MessageKind {
    /// Every kind with a payload type, i.e. all but `Unknown`.
    pub const ALL: [MessageKind; 21] = [
        MessageKind::Address,
        MessageKind::Alert,
        MessageKind::Block,
        MessageKind::FilterAdd,
        MessageKind::FilterClear,
        MessageKind::FilterLoad,
        MessageKind::GetAddress,
        MessageKind::GetBlocks,
        MessageKind::GetData,
        MessageKind::GetHeaders,
        MessageKind::Headers,
        MessageKind::Inventory,
        MessageKind::MemoryPool,
        MessageKind::MerkleBlock,
        MessageKind::NotFound,
        MessageKind::Ping,
        MessageKind::Pong,
        MessageKind::Reject,
        MessageKind::Transaction,
        MessageKind::Verack,
        MessageKind::Version,
    ];

    /// The wire command string for this kind. `Unknown` has none and maps
    /// to the empty string.
    pub fn command(&self) -> &'static str {
        match self {
            MessageKind::Address => "addr",
            MessageKind::Alert => "alert",
            MessageKind::Block => "block",
            MessageKind::FilterAdd => "filteradd",
            MessageKind::FilterClear => "filterclear",
            MessageKind::FilterLoad => "filterload",
            MessageKind::GetAddress => "getaddr",
            MessageKind::GetBlocks => "getblocks",
            MessageKind::GetData => "getdata",
            MessageKind::GetHeaders => "getheaders",
            MessageKind::Headers => "headers",
            MessageKind::Inventory => "inv",
            MessageKind::MemoryPool => "mempool",
            MessageKind::MerkleBlock => "merkleblock",
            MessageKind::NotFound => "notfound",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::Reject => "reject",
            MessageKind::Transaction => "tx",
            MessageKind::Verack => "verack",
            MessageKind::Version => "version",
            MessageKind::Unknown => "",
        }
    }

    /// Maps a wire command string to its kind; unrecognized commands come
    /// back as `Unknown` rather than an error, so the hub can answer them
    /// uniformly.
    pub fn from_command(command: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.command() == command)
            .unwrap_or(MessageKind::Unknown)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Unknown => write!(f, "unknown"),
            other => write!(f, "{}", other.command()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tagged Payload
// ---------------------------------------------------------------------------

/// A decoded payload of any kind, tagged by its variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// An `addr` payload.
    Address(Address),
    /// An `alert` payload.
    Alert(Alert),
    /// A `block` payload.
    Block(Block),
    /// A `filteradd` payload.
    FilterAdd(FilterAdd),
    /// A `filterclear` payload.
    FilterClear(FilterClear),
    /// A `filterload` payload.
    FilterLoad(FilterLoad),
    /// A `getaddr` payload.
    GetAddress(GetAddress),
    /// A `getblocks` payload.
    GetBlocks(GetBlocks),
    /// A `getdata` payload.
    GetData(GetData),
    /// A `getheaders` payload.
    GetHeaders(GetHeaders),
    /// A `headers` payload.
    Headers(Headers),
    /// An `inv` payload.
    Inventory(Inventory),
    /// A `mempool` payload.
    MemoryPool(MemoryPool),
    /// A `merkleblock` payload.
    MerkleBlock(MerkleBlock),
    /// A `notfound` payload.
    NotFound(NotFound),
    /// A `ping` payload.
    Ping(Ping),
    /// A `pong` payload.
    Pong(Pong),
    /// A `reject` payload.
    Reject(Reject),
    /// A `tx` payload.
    Transaction(Transaction),
    /// A `verack` payload.
    Verack(Verack),
    /// A `version` payload.
    Version(Version),
}

impl Payload {
    /// The kind tag of this payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Address(_) => MessageKind::Address,
            Payload::Alert(_) => MessageKind::Alert,
            Payload::Block(_) => MessageKind::Block,
            Payload::FilterAdd(_) => MessageKind::FilterAdd,
            Payload::FilterClear(_) => MessageKind::FilterClear,
            Payload::FilterLoad(_) => MessageKind::FilterLoad,
            Payload::GetAddress(_) => MessageKind::GetAddress,
            Payload::GetBlocks(_) => MessageKind::GetBlocks,
            Payload::GetData(_) => MessageKind::GetData,
            Payload::GetHeaders(_) => MessageKind::GetHeaders,
            Payload::Headers(_) => MessageKind::Headers,
            Payload::Inventory(_) => MessageKind::Inventory,
            Payload::MemoryPool(_) => MessageKind::MemoryPool,
            Payload::MerkleBlock(_) => MessageKind::MerkleBlock,
            Payload::NotFound(_) => MessageKind::NotFound,
            Payload::Ping(_) => MessageKind::Ping,
            Payload::Pong(_) => MessageKind::Pong,
            Payload::Reject(_) => MessageKind::Reject,
            Payload::Transaction(_) => MessageKind::Transaction,
            Payload::Verack(_) => MessageKind::Verack,
            Payload::Version(_) => MessageKind::Version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_mapping_roundtrips() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_command(kind.command()), kind);
        }
    }

    #[test]
    fn unrecognized_command_is_unknown() {
        assert_eq!(MessageKind::from_command("sendcmpct"), MessageKind::Unknown);
        assert_eq!(MessageKind::from_command(""), MessageKind::Unknown);
    }

    #[test]
    fn all_excludes_the_sentinel() {
        assert_eq!(MessageKind::ALL.len(), 21);
        assert!(!MessageKind::ALL.contains(&MessageKind::Unknown));
    }

    #[test]
    fn payload_kind_tags() {
        assert_eq!(Payload::Ping(Ping { nonce: 1 }).kind(), MessageKind::Ping);
        assert_eq!(Payload::Verack(Verack).kind(), MessageKind::Verack);
        assert_eq!(
            Payload::Version(Version::default()).kind(),
            MessageKind::Version
        );
    }

    #[test]
    fn display_uses_commands() {
        assert_eq!(MessageKind::Inventory.to_string(), "inv");
        assert_eq!(MessageKind::Unknown.to_string(), "unknown");
    }
}
