//! End-to-end integration tests for the session and dispatch core.
//!
//! These tests run the real pipeline — session, version protocol, message
//! hub, pending table, and network façade — against a scripted channel.
//! Only the channel is mocked: its fake remote side answers our `version`
//! by loading the peer's handshake bytes straight into the channel hub,
//! which also exercises the decode path end to end.
//!
//! Each test builds its own façade and channels. No shared state, no test
//! ordering dependencies.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use axon_network::authority::Authority;
use axon_network::channel::{Channel, ChannelRef};
use axon_network::config::NetworkSettings;
use axon_network::error::NetworkError;
use axon_network::hub::MessageHub;
use axon_network::message::{MessageKind, Payload, Version};
use axon_network::p2p::{NetworkContext, P2p};
use axon_network::session::Session;
use axon_network::subscriber::StopDispatcher;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Settings tuned for tests: a short handshake deadline so silent-peer
/// scenarios fail in milliseconds, not half a minute.
fn test_settings() -> NetworkSettings {
    NetworkSettings {
        handshake_timeout: Duration::from_millis(200),
        ..NetworkSettings::default()
    }
}

/// Encodes a minimal peer `version` payload: just enough wire bytes for
/// the hub to decode the fields the registration pipeline inspects.
fn version_bytes(value: u32, nonce: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&value.to_le_bytes());
    bytes.extend_from_slice(&1u64.to_le_bytes()); // services
    bytes.extend_from_slice(&1_700_000_000u64.to_le_bytes()); // timestamp
    for _ in 0..2 {
        // receiver + sender address records
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        bytes.extend_from_slice(&0u16.to_be_bytes());
    }
    bytes.extend_from_slice(&nonce.to_le_bytes());
    bytes.push(11);
    bytes.extend_from_slice(b"/peer:0.1./");
    bytes.extend_from_slice(&0u32.to_le_bytes()); // start height
    bytes.push(1); // relay
    bytes
}

/// How the scripted remote side behaves when our `version` goes out.
#[derive(Clone, Copy)]
enum PeerScript {
    /// Replies with `version` (given value and nonce) followed by `verack`.
    Answers { value: u32, nonce: u64 },
    /// Never replies; the handshake must time out.
    Silent,
}

/// A scripted channel: records what the session does to it and plays the
/// remote side of the handshake through its own hub.
struct MockChannel {
    authority: Authority,
    script: PeerScript,
    hub: MessageHub,
    stop: StopDispatcher,
    nonce: AtomicU64,
    notify: AtomicBool,
    version: Mutex<Option<Version>>,
    started: AtomicBool,
    fail_start: AtomicBool,
    stopped_with: Mutex<Option<NetworkError>>,
    /// Facade under test, used to observe the pending table from inside
    /// the handshake (i.e., mid-registration).
    pend_probe: Mutex<Option<Arc<P2p>>>,
    pended_during_handshake: AtomicBool,
    nonce_during_handshake: AtomicU64,
}

impl MockChannel {
    fn new(authority: &str, script: PeerScript) -> Arc<Self> {
        Arc::new(Self {
            authority: authority.parse().unwrap(),
            script,
            hub: MessageHub::new(),
            stop: StopDispatcher::new(),
            nonce: AtomicU64::new(0),
            notify: AtomicBool::new(false),
            version: Mutex::new(None),
            started: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            stopped_with: Mutex::new(None),
            pend_probe: Mutex::new(None),
            pended_during_handshake: AtomicBool::new(false),
            nonce_during_handshake: AtomicU64::new(0),
        })
    }

    fn probe_pending(&self, network: &Arc<P2p>) {
        *self.pend_probe.lock() = Some(Arc::clone(network));
    }

    fn stopped_with(&self) -> Option<NetworkError> {
        self.stopped_with.lock().clone()
    }
}

#[async_trait]
impl Channel for MockChannel {
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
        if !matches!(payload, Payload::Version(_)) {
            return Ok(());
        }

        // Our `version` just went out: snapshot the registration state the
        // session established before I/O, then play the remote side.
        self.nonce_during_handshake
            .store(self.nonce(), Ordering::SeqCst);
        if let Some(network) = self.pend_probe.lock().as_ref() {
            self.pended_during_handshake
                .store(network.pending().exists(self.nonce()), Ordering::SeqCst);
        }

        if let PeerScript::Answers { value, nonce } = self.script {
            self.hub
                .load(MessageKind::Version, &version_bytes(value, nonce))
                .expect("scripted version bytes decode");
            self.hub
                .load(MessageKind::Verack, &[])
                .expect("verack decodes from empty payload");
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), NetworkError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport("refused".into()));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self, reason: NetworkError) {
        *self.stopped_with.lock() = Some(reason.clone());
        self.stop.fire(reason);
    }

    fn subscribe_stop(&self) -> oneshot::Receiver<NetworkError> {
        self.stop.subscribe()
    }
}

/// Starts a session over a fresh façade.
fn started_session(network: &Arc<P2p>, incoming: bool) -> Session {
    let facade: Arc<dyn NetworkContext> = Arc::clone(network) as Arc<dyn NetworkContext>;
    let session = if incoming {
        Session::inbound(facade)
    } else {
        Session::outbound(facade)
    };
    session.start().expect("fresh session starts");
    session
}

/// A stop callback that reports into a oneshot and flips a flag.
fn stop_probe() -> (
    impl FnOnce(NetworkError) + Send + 'static,
    oneshot::Receiver<NetworkError>,
    Arc<AtomicBool>,
) {
    let fired = Arc::new(AtomicBool::new(false));
    let fired_clone = Arc::clone(&fired);
    let (tx, rx) = oneshot::channel();
    let callback = move |code: NetworkError| {
        fired_clone.store(true, Ordering::SeqCst);
        let _ = tx.send(code);
    };
    (callback, rx, fired)
}

// ---------------------------------------------------------------------------
// Outbound Registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn outbound_happy_path() {
    let network = P2p::new(test_settings());
    let session = started_session(&network, false);

    let channel = MockChannel::new(
        "198.51.100.4:9777",
        PeerScript::Answers {
            value: 70_001, // exactly the floor is acceptable
            nonce: 0x5151,
        },
    );
    channel.probe_pending(&network);

    let (on_stopped, stopped_rx, _) = stop_probe();
    let result = session
        .register_channel(channel.clone() as ChannelRef, on_stopped)
        .await;
    assert_eq!(result, Ok(()));

    // The channel went through the full pipeline.
    assert!(channel.started.load(Ordering::SeqCst));
    assert!(channel.notify.load(Ordering::SeqCst));
    assert_eq!(channel.version().unwrap().value, 70_001);
    assert_eq!(network.connected_count().await, 1);

    // Mid-handshake the dial was pended under a nonzero nonce; after
    // completion the table is empty and the nonce is back to zero.
    assert!(channel.pended_during_handshake.load(Ordering::SeqCst));
    assert_ne!(channel.nonce_during_handshake.load(Ordering::SeqCst), 0);
    assert!(network.pending().is_empty());
    assert_eq!(channel.nonce(), 0);

    // The stop callback is armed: stopping the channel removes it from the
    // peer store and then reports the code, exactly once.
    channel.stop(NetworkError::Transport("connection reset".into()));
    assert_eq!(
        stopped_rx.await.unwrap(),
        NetworkError::Transport("connection reset".into())
    );
    assert_eq!(network.connected_count().await, 0);
}

#[tokio::test]
async fn channel_start_failure_propagates_and_never_arms() {
    let network = P2p::new(test_settings());
    let session = started_session(&network, false);

    let channel = MockChannel::new("198.51.100.5:9777", PeerScript::Silent);
    channel.fail_start.store(true, Ordering::SeqCst);

    let (on_stopped, _rx, fired) = stop_probe();
    let result = session
        .register_channel(channel.clone() as ChannelRef, on_stopped)
        .await;
    assert_eq!(result, Err(NetworkError::Transport("refused".into())));

    // Failure path: the channel was stopped with the failing code, the
    // pend was rolled back, and the stop callback never fired.
    assert_eq!(
        channel.stopped_with(),
        Some(NetworkError::Transport("refused".into()))
    );
    assert!(network.pending().is_empty());
    assert_eq!(channel.nonce(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!fired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn silent_peer_times_out() {
    let network = P2p::new(test_settings());
    let session = started_session(&network, false);

    let channel = MockChannel::new("198.51.100.6:9777", PeerScript::Silent);
    let (on_stopped, _rx, fired) = stop_probe();

    let result = session
        .register_channel(channel.clone() as ChannelRef, on_stopped)
        .await;
    assert_eq!(result, Err(NetworkError::ChannelTimeout));
    assert_eq!(channel.stopped_with(), Some(NetworkError::ChannelTimeout));
    assert_eq!(network.connected_count().await, 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!fired.load(Ordering::SeqCst));
}

// ---------------------------------------------------------------------------
// Inbound Registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inbound_happy_path_skips_pending() {
    let network = P2p::new(test_settings());
    let session = started_session(&network, true);

    let channel = MockChannel::new(
        "203.0.113.20:40001",
        PeerScript::Answers {
            value: 70_002,
            nonce: 0xAAAA,
        },
    );
    channel.probe_pending(&network);

    let (on_stopped, _rx, _) = stop_probe();
    let result = session
        .register_channel(channel.clone() as ChannelRef, on_stopped)
        .await;
    assert_eq!(result, Ok(()));

    // Inbound channels are never pended and keep a zero nonce; the notify
    // hint is left alone.
    assert!(!channel.pended_during_handshake.load(Ordering::SeqCst));
    assert_eq!(channel.nonce(), 0);
    assert!(!channel.notify.load(Ordering::SeqCst));
    assert_eq!(network.connected_count().await, 1);
}

#[tokio::test]
async fn loopback_connection_rejected() {
    let network = P2p::new(test_settings());
    let session = started_session(&network, true);

    // Some outbound dial of ours is pending under this nonce.
    let dialing = MockChannel::new("10.0.0.9:9777", PeerScript::Silent);
    dialing.set_nonce(0xDEAD_BEEF);
    network
        .pending()
        .store(dialing as ChannelRef)
        .expect("pend the outbound dial");

    // An "inbound peer" advertises the same nonce: it is us.
    let channel = MockChannel::new(
        "203.0.113.21:40002",
        PeerScript::Answers {
            value: 70_002,
            nonce: 0xDEAD_BEEF,
        },
    );

    let (on_stopped, _rx, fired) = stop_probe();
    let result = session
        .register_channel(channel.clone() as ChannelRef, on_stopped)
        .await;
    assert_eq!(result, Err(NetworkError::AcceptFailed));

    // The channel was stopped and the peer store never saw it.
    assert_eq!(channel.stopped_with(), Some(NetworkError::AcceptFailed));
    assert_eq!(network.connected_count().await, 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!fired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn version_below_minimum_rejected() {
    let network = P2p::new(test_settings()); // floor is 70_001
    let session = started_session(&network, true);

    let channel = MockChannel::new(
        "203.0.113.22:40003",
        PeerScript::Answers {
            value: 60_000,
            nonce: 0xBBBB,
        },
    );

    let (on_stopped, _rx, _) = stop_probe();
    let result = session
        .register_channel(channel.clone() as ChannelRef, on_stopped)
        .await;
    assert_eq!(result, Err(NetworkError::AcceptFailed));
    assert_eq!(channel.stopped_with(), Some(NetworkError::AcceptFailed));
    assert_eq!(network.connected_count().await, 0);
}

// ---------------------------------------------------------------------------
// Session Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_twice_is_operation_failed() {
    let network = P2p::new(test_settings());
    let facade: Arc<dyn NetworkContext> = network as Arc<dyn NetworkContext>;

    let session = Session::outbound(facade);
    assert!(session.stopped());
    assert_eq!(session.start(), Ok(()));
    assert!(!session.stopped());
    assert_eq!(session.start(), Err(NetworkError::OperationFailed));
}

#[tokio::test]
async fn register_on_unstarted_session_fails_fast() {
    let network = P2p::new(test_settings());
    let facade: Arc<dyn NetworkContext> = Arc::clone(&network) as Arc<dyn NetworkContext>;
    let session = Session::outbound(facade); // never started

    let channel = MockChannel::new("198.51.100.7:9777", PeerScript::Silent);
    let (on_stopped, _rx, _) = stop_probe();

    let result = session
        .register_channel(channel.clone() as ChannelRef, on_stopped)
        .await;
    assert_eq!(result, Err(NetworkError::ServiceStopped));
    assert!(!channel.started.load(Ordering::SeqCst));
}

#[tokio::test]
async fn registration_after_network_stop() {
    let network = P2p::new(test_settings());
    let session = started_session(&network, false);

    network.close();
    // Let the session's stop watcher observe the signal.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(session.stopped());

    let channel = MockChannel::new("198.51.100.8:9777", PeerScript::Silent);
    let (on_stopped, _rx, _) = stop_probe();

    let result = session
        .register_channel(channel.clone() as ChannelRef, on_stopped)
        .await;
    assert_eq!(result, Err(NetworkError::ServiceStopped));

    // The channel was never started and never pended.
    assert!(!channel.started.load(Ordering::SeqCst));
    assert!(network.pending().is_empty());
}

#[tokio::test]
async fn session_resources_release_on_network_stop() {
    let network = P2p::new(test_settings());
    let session = started_session(&network, false);

    let acceptor = session.create_acceptor();
    let connector = session.create_connector();
    assert!(!acceptor.stopped());
    assert!(!connector.stopped());

    network.close();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(acceptor.stopped());
    assert!(connector.stopped());
}

#[tokio::test]
async fn blacklist_membership() {
    let blocked: Authority = "192.0.2.66:9777".parse().unwrap();
    let settings = NetworkSettings {
        blacklists: vec![blocked],
        ..test_settings()
    };
    let network = P2p::new(settings);
    let session = started_session(&network, true);

    assert!(session.blacklisted(&blocked));
    assert!(!session.blacklisted(&"192.0.2.67:9777".parse().unwrap()));
}

#[tokio::test]
async fn duplicate_authority_is_rejected_by_the_store() {
    let network = P2p::new(test_settings());
    let session = started_session(&network, true);
    let script = PeerScript::Answers {
        value: 70_002,
        nonce: 0xCCCC,
    };

    let first = MockChannel::new("203.0.113.30:40010", script);
    let (on_stopped, _rx, _) = stop_probe();
    session
        .register_channel(first as ChannelRef, on_stopped)
        .await
        .unwrap();

    // Same authority again: the peer store refuses, registration fails.
    let second = MockChannel::new(
        "203.0.113.30:40010",
        PeerScript::Answers {
            value: 70_002,
            nonce: 0xDDDD,
        },
    );
    let (on_stopped, _rx, fired) = stop_probe();
    let result = session
        .register_channel(second.clone() as ChannelRef, on_stopped)
        .await;
    assert_eq!(result, Err(NetworkError::AddressInUse));
    assert_eq!(second.stopped_with(), Some(NetworkError::AddressInUse));
    assert_eq!(network.connected_count().await, 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!fired.load(Ordering::SeqCst));
}
