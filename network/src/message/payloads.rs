//! Wire payload types, one per message kind.
//!
//! Each type carries its deterministic decode from a [`ByteReader`].
//! Integers are little-endian except the port inside an address record,
//! which rides big-endian. Encoding lives in the external codec — this
//! crate only ever consumes bytes.

use std::net::{IpAddr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::authority::Authority;
use crate::error::NetworkError;
use crate::message::reader::ByteReader;
use crate::message::Decode;

// ---------------------------------------------------------------------------
// Shared Records
// ---------------------------------------------------------------------------

/// A peer address record as carried inside `version` and `addr` payloads.
///
/// The 16-byte address field holds IPv6 directly and IPv4 in its
/// v4-mapped form (`::ffff:a.b.c.d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddress {
    /// Service bits the peer advertises.
    pub services: u64,
    /// The peer address, always 16 bytes on the wire.
    pub ip: [u8; 16],
    /// The peer port (big-endian on the wire).
    pub port: u16,
}

impl NetworkAddress {
    /// The unspecified address, used when a side of the handshake has
    /// nothing meaningful to report.
    pub fn unspecified() -> Self {
        Self {
            services: 0,
            ip: [0u8; 16],
            port: 0,
        }
    }

    /// Builds a record from an authority, v4-mapping IPv4 addresses.
    pub fn from_authority(authority: &Authority, services: u64) -> Self {
        let ip = match authority.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };
        Self {
            services,
            ip,
            port: authority.port(),
        }
    }

    /// Recovers the authority, unmapping v4-mapped addresses.
    pub fn authority(&self) -> Authority {
        let v6 = Ipv6Addr::from(self.ip);
        let ip = match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        };
        Authority::new(ip, self.port)
    }
}

impl Default for NetworkAddress {
    fn default() -> Self {
        Self::unspecified()
    }
}

impl Decode for NetworkAddress {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            services: reader.read_u64_le()?,
            ip: reader.read_ip()?,
            port: reader.read_u16_be()?,
        })
    }
}

/// An address record with the last-seen timestamp relays attach to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedAddress {
    /// Unix timestamp (seconds) of the last sighting.
    pub timestamp: u32,
    /// The address record itself.
    pub address: NetworkAddress,
}

impl Decode for TimestampedAddress {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            timestamp: reader.read_u32_le()?,
            address: NetworkAddress::decode(reader)?,
        })
    }
}

/// The object class an inventory vector points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InventoryType {
    /// A transaction, referenced by its hash.
    Transaction,
    /// A block, referenced by its header hash.
    Block,
    /// A filtered (merkle) block.
    FilteredBlock,
}

impl InventoryType {
    fn from_wire(value: u32) -> Result<Self, NetworkError> {
        match value {
            1 => Ok(Self::Transaction),
            2 => Ok(Self::Block),
            3 => Ok(Self::FilteredBlock),
            other => Err(NetworkError::BadStream(format!(
                "unknown inventory type {}",
                other
            ))),
        }
    }
}

/// A typed hash reference used by `inv`, `getdata`, and `notfound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryVector {
    /// What the hash refers to.
    pub kind: InventoryType,
    /// The referenced object's hash.
    pub hash: [u8; 32],
}

impl Decode for InventoryVector {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            kind: InventoryType::from_wire(reader.read_u32_le()?)?,
            hash: reader.read_hash()?,
        })
    }
}

/// A block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block format version.
    pub version: u32,
    /// Hash of the preceding block.
    pub previous: [u8; 32],
    /// Merkle root over the block's transactions.
    pub merkle_root: [u8; 32],
    /// Block timestamp (Unix seconds).
    pub timestamp: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl Decode for BlockHeader {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            version: reader.read_u32_le()?,
            previous: reader.read_hash()?,
            merkle_root: reader.read_hash()?,
            timestamp: reader.read_u32_le()?,
            bits: reader.read_u32_le()?,
            nonce: reader.read_u32_le()?,
        })
    }
}

/// A reference to a previous transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutPoint {
    /// Hash of the spent transaction.
    pub hash: [u8; 32],
    /// Output index within that transaction.
    pub index: u32,
}

impl Decode for OutPoint {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            hash: reader.read_hash()?,
            index: reader.read_u32_le()?,
        })
    }
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// The output being spent.
    pub previous_output: OutPoint,
    /// Unlocking script bytes.
    pub script: Vec<u8>,
    /// Sequence number.
    pub sequence: u32,
}

impl Decode for TxInput {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            previous_output: OutPoint::decode(reader)?,
            script: reader.read_var_bytes()?,
            sequence: reader.read_u32_le()?,
        })
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Output value in base units.
    pub value: u64,
    /// Locking script bytes.
    pub script: Vec<u8>,
}

impl Decode for TxOutput {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            value: reader.read_u64_le()?,
            script: reader.read_var_bytes()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Message Payloads
// ---------------------------------------------------------------------------

/// `addr` — a batch of known peer addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    /// The relayed address records.
    pub addresses: Vec<TimestampedAddress>,
}

impl Decode for Address {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        // 4 timestamp + 8 services + 16 ip + 2 port per record.
        let count = reader.read_count(30)?;
        let mut addresses = Vec::with_capacity(count);
        for _ in 0..count {
            addresses.push(TimestampedAddress::decode(reader)?);
        }
        Ok(Self { addresses })
    }
}

/// `alert` — a signed network-wide notice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Alert {
    /// Serialized alert body.
    pub payload: Vec<u8>,
    /// Signature over the body.
    pub signature: Vec<u8>,
}

impl Decode for Alert {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            payload: reader.read_var_bytes()?,
            signature: reader.read_var_bytes()?,
        })
    }
}

/// `block` — a full block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block header.
    pub header: BlockHeader,
    /// The block body.
    pub transactions: Vec<Transaction>,
}

impl Decode for Block {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        let header = BlockHeader::decode(reader)?;
        // A transaction is at least version + empty in/out counts + lock time.
        let count = reader.read_count(10)?;
        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            transactions.push(Transaction::decode(reader)?);
        }
        Ok(Self {
            header,
            transactions,
        })
    }
}

/// `filteradd` — add one element to the peer's bloom filter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterAdd {
    /// The element to insert.
    pub data: Vec<u8>,
}

impl Decode for FilterAdd {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            data: reader.read_var_bytes()?,
        })
    }
}

/// `filterclear` — drop the peer's bloom filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterClear;

impl Decode for FilterClear {
    fn decode(_reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self)
    }
}

/// `filterload` — install a bloom filter for transaction relay.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterLoad {
    /// The filter bit field.
    pub filter: Vec<u8>,
    /// Number of hash functions the filter uses.
    pub hash_functions: u32,
    /// Random tweak mixed into each hash.
    pub tweak: u32,
    /// Matching behavior flags.
    pub flags: u8,
}

impl Decode for FilterLoad {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            filter: reader.read_var_bytes()?,
            hash_functions: reader.read_u32_le()?,
            tweak: reader.read_u32_le()?,
            flags: reader.read_u8()?,
        })
    }
}

/// `getaddr` — ask the peer for addresses it knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetAddress;

impl Decode for GetAddress {
    fn decode(_reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self)
    }
}

/// `getblocks` — request block inventory following a locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBlocks {
    /// Block locator hashes, newest first.
    pub start_hashes: Vec<[u8; 32]>,
    /// Hash to stop at, or zero for "as many as allowed".
    pub stop_hash: [u8; 32],
}

impl Decode for GetBlocks {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        let count = reader.read_count(32)?;
        let mut start_hashes = Vec::with_capacity(count);
        for _ in 0..count {
            start_hashes.push(reader.read_hash()?);
        }
        Ok(Self {
            start_hashes,
            stop_hash: reader.read_hash()?,
        })
    }
}

/// `getdata` — request the objects behind inventory vectors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetData {
    /// The requested objects.
    pub inventory: Vec<InventoryVector>,
}

impl Decode for GetData {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            inventory: decode_inventory(reader)?,
        })
    }
}

/// `getheaders` — request headers following a locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHeaders {
    /// Block locator hashes, newest first.
    pub start_hashes: Vec<[u8; 32]>,
    /// Hash to stop at, or zero for "as many as allowed".
    pub stop_hash: [u8; 32],
}

impl Decode for GetHeaders {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        let count = reader.read_count(32)?;
        let mut start_hashes = Vec::with_capacity(count);
        for _ in 0..count {
            start_hashes.push(reader.read_hash()?);
        }
        Ok(Self {
            start_hashes,
            stop_hash: reader.read_hash()?,
        })
    }
}

/// `headers` — a batch of block headers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Headers {
    /// The headers, in chain order.
    pub headers: Vec<BlockHeader>,
}

impl Decode for Headers {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        let count = reader.read_count(80)?;
        let mut headers = Vec::with_capacity(count);
        for _ in 0..count {
            headers.push(BlockHeader::decode(reader)?);
        }
        Ok(Self { headers })
    }
}

/// `inv` — announce objects the peer has.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Inventory {
    /// The announced objects.
    pub inventory: Vec<InventoryVector>,
}

impl Decode for Inventory {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            inventory: decode_inventory(reader)?,
        })
    }
}

/// `mempool` — ask the peer to announce its mempool contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryPool;

impl Decode for MemoryPool {
    fn decode(_reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self)
    }
}

/// `merkleblock` — a filtered block: header plus a partial merkle branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleBlock {
    /// The block header.
    pub header: BlockHeader,
    /// Total transactions in the full block.
    pub total_transactions: u32,
    /// Hashes of the partial merkle tree.
    pub hashes: Vec<[u8; 32]>,
    /// Traversal flag bits.
    pub flags: Vec<u8>,
}

impl Decode for MerkleBlock {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        let header = BlockHeader::decode(reader)?;
        let total_transactions = reader.read_u32_le()?;
        let count = reader.read_count(32)?;
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            hashes.push(reader.read_hash()?);
        }
        Ok(Self {
            header,
            total_transactions,
            hashes,
            flags: reader.read_var_bytes()?,
        })
    }
}

/// `notfound` — the peer does not have the requested objects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotFound {
    /// The objects the peer could not serve.
    pub inventory: Vec<InventoryVector>,
}

impl Decode for NotFound {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            inventory: decode_inventory(reader)?,
        })
    }
}

/// `ping` — keepalive probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ping {
    /// Nonce echoed back by the matching `pong`.
    pub nonce: u64,
}

impl Decode for Ping {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            nonce: reader.read_u64_le()?,
        })
    }
}

/// `pong` — keepalive reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pong {
    /// Nonce copied from the `ping` being answered.
    pub nonce: u64,
}

impl Decode for Pong {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            nonce: reader.read_u64_le()?,
        })
    }
}

/// `reject` — the peer refused one of our messages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reject {
    /// Command string of the rejected message.
    pub message: String,
    /// Machine-readable rejection code.
    pub code: u8,
    /// Human-readable explanation.
    pub reason: String,
}

impl Decode for Reject {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            message: reader.read_var_string()?,
            code: reader.read_u8()?,
            reason: reader.read_var_string()?,
        })
    }
}

/// `tx` — a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction format version.
    pub version: u32,
    /// Inputs being spent.
    pub inputs: Vec<TxInput>,
    /// Outputs being created.
    pub outputs: Vec<TxOutput>,
    /// Earliest time or height this transaction is valid.
    pub lock_time: u32,
}

impl Decode for Transaction {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        let version = reader.read_u32_le()?;

        // 36 outpoint + 1 script length + 4 sequence minimum per input.
        let input_count = reader.read_count(41)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TxInput::decode(reader)?);
        }

        // 8 value + 1 script length minimum per output.
        let output_count = reader.read_count(9)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TxOutput::decode(reader)?);
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time: reader.read_u32_le()?,
        })
    }
}

/// `verack` — acknowledge a `version` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Verack;

impl Decode for Verack {
    fn decode(_reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self)
    }
}

/// `version` — the opening message of the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Protocol version the peer speaks.
    pub value: u32,
    /// Service bits the peer advertises.
    pub services: u64,
    /// Peer wall clock (Unix seconds).
    pub timestamp: u64,
    /// The address the peer believes it is talking to.
    pub address_receiver: NetworkAddress,
    /// The address the peer claims for itself.
    pub address_sender: NetworkAddress,
    /// Random connection nonce, used for loopback detection.
    pub nonce: u64,
    /// Free-form client identification.
    pub user_agent: String,
    /// Height of the peer's best chain.
    pub start_height: u32,
    /// Whether the peer wants transaction relay.
    pub relay: bool,
}

impl Default for Version {
    fn default() -> Self {
        Self {
            value: 0,
            services: 0,
            timestamp: 0,
            address_receiver: NetworkAddress::unspecified(),
            address_sender: NetworkAddress::unspecified(),
            nonce: 0,
            user_agent: String::new(),
            start_height: 0,
            relay: true,
        }
    }
}

impl Decode for Version {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, NetworkError> {
        Ok(Self {
            value: reader.read_u32_le()?,
            services: reader.read_u64_le()?,
            timestamp: reader.read_u64_le()?,
            address_receiver: NetworkAddress::decode(reader)?,
            address_sender: NetworkAddress::decode(reader)?,
            nonce: reader.read_u64_le()?,
            user_agent: reader.read_var_string()?,
            start_height: reader.read_u32_le()?,
            // The relay flag is optional on the wire; absent means yes.
            relay: if reader.is_exhausted() {
                true
            } else {
                reader.read_u8()? != 0
            },
        })
    }
}

fn decode_inventory(reader: &mut ByteReader<'_>) -> Result<Vec<InventoryVector>, NetworkError> {
    let count = reader.read_count(36)?;
    let mut inventory = Vec::with_capacity(count);
    for _ in 0..count {
        inventory.push(InventoryVector::decode(reader)?);
    }
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_decode() {
        let bytes = 0xDEAD_BEEF_u64.to_le_bytes();
        let mut reader = ByteReader::new(&bytes);
        let ping = Ping::decode(&mut reader).unwrap();
        assert_eq!(ping.nonce, 0xDEAD_BEEF);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn inventory_decode_and_bad_type() {
        let mut bytes = vec![0x01]; // one vector
        bytes.extend_from_slice(&2u32.to_le_bytes()); // block
        bytes.extend_from_slice(&[0xaa; 32]);
        let mut reader = ByteReader::new(&bytes);
        let inv = Inventory::decode(&mut reader).unwrap();
        assert_eq!(inv.inventory.len(), 1);
        assert_eq!(inv.inventory[0].kind, InventoryType::Block);

        let mut bad = vec![0x01];
        bad.extend_from_slice(&9u32.to_le_bytes()); // no such type
        bad.extend_from_slice(&[0u8; 32]);
        let mut reader = ByteReader::new(&bad);
        assert!(matches!(
            Inventory::decode(&mut reader),
            Err(NetworkError::BadStream(_))
        ));
    }

    #[test]
    fn version_decode_with_and_without_relay_byte() {
        fn version_bytes(relay: Option<u8>) -> Vec<u8> {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&70_002u32.to_le_bytes());
            bytes.extend_from_slice(&1u64.to_le_bytes()); // services
            bytes.extend_from_slice(&1_700_000_000u64.to_le_bytes());
            for _ in 0..2 {
                bytes.extend_from_slice(&0u64.to_le_bytes()); // services
                bytes.extend_from_slice(&[0u8; 16]); // ip
                bytes.extend_from_slice(&0u16.to_be_bytes()); // port
            }
            bytes.extend_from_slice(&0x1234u64.to_le_bytes()); // nonce
            bytes.push(7); // user agent length
            bytes.extend_from_slice(b"/axon:/");
            bytes.extend_from_slice(&100u32.to_le_bytes()); // start height
            if let Some(flag) = relay {
                bytes.push(flag);
            }
            bytes
        }

        let bytes = version_bytes(Some(0));
        let version = Version::decode(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(version.value, 70_002);
        assert_eq!(version.nonce, 0x1234);
        assert_eq!(version.user_agent, "/axon:/");
        assert!(!version.relay);

        let bytes = version_bytes(None);
        let version = Version::decode(&mut ByteReader::new(&bytes)).unwrap();
        assert!(version.relay);
    }

    #[test]
    fn address_roundtrips_v4_mapping() {
        let authority: Authority = "203.0.113.9:9777".parse().unwrap();
        let record = NetworkAddress::from_authority(&authority, 1);
        assert_eq!(record.authority(), authority);
    }

    #[test]
    fn truncated_block_is_a_stream_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 32]); // previous
                                             // merkle root missing entirely
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(
            Block::decode(&mut reader),
            Err(NetworkError::BadStream(_))
        ));
    }
}
