//! # TCP Transport Channel
//!
//! The concrete [`Channel`] this node runs over plain TCP. Frames are
//! `magic (u32 LE) | command (12 bytes, zero padded) | length (u32 LE) |
//! payload`; inbound frames are demultiplexed into the channel's message
//! hub by kind, outbound payloads are framed from the small encoder set
//! below.
//!
//! The read pump engages with the channel's first outbound message, not at
//! `start`. Handshake code subscribes to the hub between `start` and its
//! first send, and frames that arrive before the pump runs wait in the
//! socket buffer — so an eager peer can never slip a message past a
//! subscription that is still being installed.
//!
//! Only the messages this node originates have encoders; the rest arrive
//! with the protocols that send them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use axon_network::authority::Authority;
use axon_network::channel::Channel;
use axon_network::error::NetworkError;
use axon_network::hub::MessageHub;
use axon_network::message::{MessageKind, NetworkAddress, Payload, Version};
use axon_network::subscriber::StopDispatcher;

/// Frame header size: 4 magic + 12 command + 4 length.
const HEADER_SIZE: usize = 20;

/// Width of the zero-padded command field.
const COMMAND_SIZE: usize = 12;

/// Upper bound on a single frame's payload. Anything larger is a
/// malformed or hostile peer, not a message.
const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

/// A peer channel over a TCP stream.
pub struct TcpChannel {
    authority: Authority,
    magic: u32,
    hub: Arc<MessageHub>,
    stop: Arc<StopDispatcher>,
    nonce: AtomicU64,
    notify: AtomicBool,
    version: Mutex<Option<Version>>,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pump_started: AtomicBool,
}

impl TcpChannel {
    /// Wraps an established stream. `magic` is the wire identifier every
    /// frame must carry.
    pub fn new(stream: TcpStream, authority: Authority, magic: u32) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();
        Arc::new(Self {
            authority,
            magic,
            hub: Arc::new(MessageHub::new()),
            stop: Arc::new(StopDispatcher::new()),
            nonce: AtomicU64::new(0),
            notify: AtomicBool::new(false),
            version: Mutex::new(None),
            reader: Mutex::new(Some(read_half)),
            writer: tokio::sync::Mutex::new(write_half),
            pump_started: AtomicBool::new(false),
        })
    }

    /// Spawns the read pump on the first call; later calls are no-ops.
    fn ensure_pump(&self) {
        if self.pump_started.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(reader) = self.reader.lock().take() {
            tokio::spawn(read_loop(
                reader,
                Arc::clone(&self.hub),
                Arc::clone(&self.stop),
                self.authority,
                self.magic,
            ));
        }
    }

    /// Fires the stop signal and wakes every pending hub read with the
    /// terminal code. Idempotent; the first code wins.
    fn shut_down(hub: &MessageHub, stop: &StopDispatcher, reason: NetworkError) {
        stop.fire(reason.clone());
        hub.broadcast(reason);
        hub.stop();
    }
}

#[async_trait]
impl Channel for TcpChannel {
    fn authority(&self) -> Authority {
        self.authority
    }

    fn nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }

    fn set_nonce(&self, nonce: u64) {
        self.nonce.store(nonce, Ordering::SeqCst);
    }

    fn set_notify(&self, notify: bool) {
        self.notify.store(notify, Ordering::SeqCst);
    }

    fn version(&self) -> Option<Version> {
        self.version.lock().clone()
    }

    fn set_version(&self, version: Version) {
        *self.version.lock() = Some(version);
    }

    fn hub(&self) -> &MessageHub {
        &self.hub
    }

    async fn send(&self, payload: Payload) -> Result<(), NetworkError> {
        if self.stop.fired() {
            return Err(NetworkError::ServiceStopped);
        }

        let body = encode(&payload).ok_or(NetworkError::OperationFailed)?;
        let frame = frame(self.magic, payload.kind(), &body);

        self.ensure_pump();

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))
    }

    async fn start(&self) -> Result<(), NetworkError> {
        if self.stop.fired() || self.pump_started.load(Ordering::SeqCst) {
            return Err(NetworkError::OperationFailed);
        }
        Ok(())
    }

    fn stop(&self, reason: NetworkError) {
        Self::shut_down(&self.hub, &self.stop, reason);
    }

    fn subscribe_stop(&self) -> oneshot::Receiver<NetworkError> {
        self.stop.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Read Pump
// ---------------------------------------------------------------------------

/// Reads frames until the socket fails or the stop signal fires, feeding
/// each into the hub by kind. Unknown commands are dropped with a log;
/// decode failures reach the kind's subscribers through the hub itself.
async fn read_loop(
    mut reader: OwnedReadHalf,
    hub: Arc<MessageHub>,
    stop: Arc<StopDispatcher>,
    authority: Authority,
    magic: u32,
) {
    let mut stop_rx = stop.subscribe();

    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader, magic) => frame,
            _ = &mut stop_rx => break,
        };

        match frame {
            Ok((kind, payload)) => match hub.load(kind, &payload) {
                Ok(()) => trace!(peer = %authority, %kind, "message dispatched"),
                Err(code) => debug!(peer = %authority, %kind, %code, "message not dispatched"),
            },
            Err(code) => {
                debug!(peer = %authority, %code, "read cycle ended");
                TcpChannel::shut_down(&hub, &stop, code);
                break;
            }
        }
    }
}

/// Reads one frame: header, magic check, then the payload bytes.
async fn read_frame(
    reader: &mut OwnedReadHalf,
    magic: u32,
) -> Result<(MessageKind, Vec<u8>), NetworkError> {
    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| NetworkError::Transport(e.to_string()))?;

    let (frame_magic, kind, length) = parse_header(&header)?;
    if frame_magic != magic {
        return Err(NetworkError::Transport("wire magic mismatch".into()));
    }

    let mut payload = vec![0u8; length];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| NetworkError::Transport(e.to_string()))?;
    Ok((kind, payload))
}

/// Splits a raw header into magic, message kind, and payload length.
/// Unrecognized commands map to `Unknown`; absurd lengths are rejected
/// before any allocation happens.
fn parse_header(header: &[u8; HEADER_SIZE]) -> Result<(u32, MessageKind, usize), NetworkError> {
    let magic = u32::from_le_bytes(header[0..4].try_into().expect("length checked"));

    let command_bytes = &header[4..4 + COMMAND_SIZE];
    let end = command_bytes
        .iter()
        .position(|byte| *byte == 0)
        .unwrap_or(COMMAND_SIZE);
    let command = std::str::from_utf8(&command_bytes[..end]).unwrap_or("");
    let kind = MessageKind::from_command(command);

    let length = u32::from_le_bytes(header[16..20].try_into().expect("length checked")) as usize;
    if length > MAX_PAYLOAD_SIZE {
        return Err(NetworkError::BadStream(format!(
            "payload of {} bytes exceeds the frame limit",
            length
        )));
    }

    Ok((magic, kind, length))
}

/// Builds one wire frame around an encoded payload body.
fn frame(magic: u32, kind: MessageKind, body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
    bytes.extend_from_slice(&magic.to_le_bytes());

    let mut command = [0u8; COMMAND_SIZE];
    let name = kind.command().as_bytes();
    command[..name.len()].copy_from_slice(name);
    bytes.extend_from_slice(&command);

    bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
    bytes.extend_from_slice(body);
    bytes
}

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

/// Encodes the payloads this node originates. `None` means the node has no
/// business sending that kind yet.
fn encode(payload: &Payload) -> Option<Vec<u8>> {
    match payload {
        Payload::Version(version) => Some(encode_version(version)),
        Payload::Verack(_)
        | Payload::GetAddress(_)
        | Payload::MemoryPool(_)
        | Payload::FilterClear(_) => Some(Vec::new()),
        Payload::Ping(ping) => Some(ping.nonce.to_le_bytes().to_vec()),
        Payload::Pong(pong) => Some(pong.nonce.to_le_bytes().to_vec()),
        _ => None,
    }
}

fn encode_version(version: &Version) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&version.value.to_le_bytes());
    bytes.extend_from_slice(&version.services.to_le_bytes());
    bytes.extend_from_slice(&version.timestamp.to_le_bytes());
    encode_address(&mut bytes, &version.address_receiver);
    encode_address(&mut bytes, &version.address_sender);
    bytes.extend_from_slice(&version.nonce.to_le_bytes());
    write_var_int(&mut bytes, version.user_agent.len() as u64);
    bytes.extend_from_slice(version.user_agent.as_bytes());
    bytes.extend_from_slice(&version.start_height.to_le_bytes());
    bytes.push(version.relay as u8);
    bytes
}

fn encode_address(bytes: &mut Vec<u8>, address: &NetworkAddress) {
    bytes.extend_from_slice(&address.services.to_le_bytes());
    bytes.extend_from_slice(&address.ip);
    bytes.extend_from_slice(&address.port.to_be_bytes());
}

fn write_var_int(bytes: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => bytes.push(value as u8),
        0xfd..=0xffff => {
            bytes.push(0xfd);
            bytes.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            bytes.push(0xfe);
            bytes.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            bytes.push(0xff);
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use axon_network::channel::ChannelRef;
    use axon_network::config::{self, NetworkSettings};
    use axon_network::message::{ByteReader, Decode, Headers};
    use axon_network::p2p::{NetworkContext, P2p};
    use axon_network::session::Session;

    #[test]
    fn frame_header_roundtrip() {
        let bytes = frame(config::MAGIC_DEVNET, MessageKind::Ping, &[1, 2, 3]);
        let header: [u8; HEADER_SIZE] = bytes[..HEADER_SIZE].try_into().unwrap();

        let (magic, kind, length) = parse_header(&header).unwrap();
        assert_eq!(magic, config::MAGIC_DEVNET);
        assert_eq!(kind, MessageKind::Ping);
        assert_eq!(length, 3);
        assert_eq!(&bytes[HEADER_SIZE..], &[1, 2, 3]);
    }

    #[test]
    fn unrecognized_command_maps_to_unknown() {
        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&config::MAGIC_DEVNET.to_le_bytes());
        header[4..13].copy_from_slice(b"sendcmpct");

        let (_, kind, _) = parse_header(&header).unwrap();
        assert_eq!(kind, MessageKind::Unknown);
    }

    #[test]
    fn oversized_length_rejected_before_allocation() {
        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&config::MAGIC_DEVNET.to_le_bytes());
        header[4..8].copy_from_slice(b"ping");
        header[16..20].copy_from_slice(&u32::MAX.to_le_bytes());

        assert!(matches!(
            parse_header(&header),
            Err(NetworkError::BadStream(_))
        ));
    }

    #[test]
    fn version_encoding_decodes_back() {
        let version = Version {
            value: 70_002,
            services: 1,
            timestamp: 1_700_000_000,
            address_receiver: NetworkAddress::unspecified(),
            address_sender: NetworkAddress::unspecified(),
            nonce: 0xABCD,
            user_agent: "/axon:0.1.0/".to_string(),
            start_height: 9,
            relay: true,
        };

        let bytes = encode_version(&version);
        let decoded = Version::decode(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(decoded, version);
    }

    #[test]
    fn kinds_the_node_never_sends_have_no_encoder() {
        assert!(encode(&Payload::Headers(Headers::default())).is_none());
        assert!(encode(&Payload::Verack(Default::default())).is_some());
    }

    #[tokio::test]
    async fn two_nodes_handshake_over_tcp() {
        let settings = NetworkSettings {
            handshake_timeout: Duration::from_secs(2),
            ..NetworkSettings::default()
        };

        // Two independent nodes: the dialer and the listener.
        let alpha = P2p::new(settings.clone());
        let beta = P2p::new(settings.clone());
        let dialer = Session::outbound(Arc::clone(&alpha) as Arc<dyn NetworkContext>);
        dialer.start().unwrap();
        let acceptor = Session::inbound(Arc::clone(&beta) as Arc<dyn NetworkContext>);
        acceptor.start().unwrap();

        // Connect a real socket pair.
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let listen_authority = Authority::from(listener.local_addr().unwrap());
        let accepting = tokio::spawn(async move { listener.accept().await.unwrap() });
        let client_stream = TcpStream::connect(listen_authority.to_socket_addr())
            .await
            .unwrap();
        let (server_stream, peer_addr) = accepting.await.unwrap();

        let outbound_channel = TcpChannel::new(client_stream, listen_authority, settings.identifier);
        let inbound_channel =
            TcpChannel::new(server_stream, Authority::from(peer_addr), settings.identifier);

        // Both sides register concurrently; the version/verack exchange
        // crosses the real socket.
        let (dialed, accepted) = tokio::join!(
            dialer.register_channel(outbound_channel as ChannelRef, |_code| {}),
            acceptor.register_channel(inbound_channel as ChannelRef, |_code| {}),
        );

        assert_eq!(dialed, Ok(()));
        assert_eq!(accepted, Ok(()));
        assert_eq!(alpha.connected_count().await, 1);
        assert_eq!(beta.connected_count().await, 1);
    }
}
