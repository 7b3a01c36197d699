//! # Pending-Nonce Table
//!
//! The set of outbound channels currently mid-dial, keyed by the random
//! nonce each dial attached to its `version` message. Inbound registrations
//! probe this table with the *remote* peer's advertised nonce: a hit means
//! the "peer" is this very process talking to itself, and the connection is
//! rejected as loopback.
//!
//! One table is shared by every outbound session of a network instance.
//! All operations serialize on the table mutex; nonce `0` is reserved as
//! "not pending" and never stored.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::channel::ChannelRef;
use crate::error::NetworkError;

/// Concurrent nonce → channel set for loopback detection.
pub struct PendingTable {
    channels: Mutex<HashMap<u64, ChannelRef>>,
}

impl PendingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Stores `channel` under its current nonce.
    ///
    /// Fails with `OperationFailed` for the reserved nonce `0` or a nonce
    /// already present — concurrent stores of one nonce serialize on the
    /// table lock, so the second caller always observes the first.
    pub fn store(&self, channel: ChannelRef) -> Result<(), NetworkError> {
        let nonce = channel.nonce();
        if nonce == 0 {
            return Err(NetworkError::OperationFailed);
        }

        let mut channels = self.channels.lock();
        if channels.contains_key(&nonce) {
            return Err(NetworkError::OperationFailed);
        }
        channels.insert(nonce, channel);
        Ok(())
    }

    /// True when a channel with this nonce is currently stored. The
    /// reserved nonce `0` is never pending.
    pub fn exists(&self, nonce: u64) -> bool {
        nonce != 0 && self.channels.lock().contains_key(&nonce)
    }

    /// Removes the entry for `nonce`.
    ///
    /// Absent entries report `NotFound`; callers treat removal as
    /// best-effort bookkeeping and log, not fail, on that.
    pub fn remove(&self, nonce: u64) -> Result<(), NetworkError> {
        match self.channels.lock().remove(&nonce) {
            Some(_) => Ok(()),
            None => Err(NetworkError::NotFound),
        }
    }

    /// Number of channels currently pending.
    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    /// True when no channel is pending.
    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use super::*;
    use crate::authority::Authority;
    use crate::channel::Channel;
    use crate::hub::MessageHub;
    use crate::message::{Payload, Version};

    struct StubChannel {
        nonce: AtomicU64,
        hub: MessageHub,
    }

    fn stub(nonce: u64) -> ChannelRef {
        Arc::new(StubChannel {
            nonce: AtomicU64::new(nonce),
            hub: MessageHub::new(),
        })
    }

    #[async_trait]
    impl Channel for StubChannel {
        fn authority(&self) -> Authority {
            "127.0.0.1:0".parse().unwrap()
        }

        fn nonce(&self) -> u64 {
            self.nonce.load(Ordering::SeqCst)
        }

        fn set_nonce(&self, nonce: u64) {
            self.nonce.store(nonce, Ordering::SeqCst);
        }

        fn set_notify(&self, _notify: bool) {}

        fn version(&self) -> Option<Version> {
            None
        }

        fn set_version(&self, _version: Version) {}

        fn hub(&self) -> &MessageHub {
            &self.hub
        }

        async fn send(&self, _payload: Payload) -> Result<(), NetworkError> {
            Ok(())
        }

        async fn start(&self) -> Result<(), NetworkError> {
            Ok(())
        }

        fn stop(&self, _reason: NetworkError) {}

        fn subscribe_stop(&self) -> oneshot::Receiver<NetworkError> {
            oneshot::channel().1
        }
    }

    #[test]
    fn store_exists_remove_cycle() {
        let table = PendingTable::new();
        assert!(!table.exists(0xDEAD_BEEF));

        table.store(stub(0xDEAD_BEEF)).unwrap();
        assert!(table.exists(0xDEAD_BEEF));
        assert_eq!(table.len(), 1);

        table.remove(0xDEAD_BEEF).unwrap();
        assert!(!table.exists(0xDEAD_BEEF));
        assert!(table.is_empty());
    }

    #[test]
    fn zero_nonce_is_never_pending() {
        let table = PendingTable::new();
        assert_eq!(table.store(stub(0)), Err(NetworkError::OperationFailed));
        assert!(!table.exists(0));
    }

    #[test]
    fn duplicate_store_observes_the_first() {
        let table = PendingTable::new();
        table.store(stub(7)).unwrap();
        assert_eq!(table.store(stub(7)), Err(NetworkError::OperationFailed));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_of_absent_entry_reports_not_found() {
        let table = PendingTable::new();
        assert_eq!(table.remove(99), Err(NetworkError::NotFound));
    }
}
