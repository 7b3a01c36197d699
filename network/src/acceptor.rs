//! # Inbound Acceptor
//!
//! Listens for inbound TCP connections and hands raw streams (plus the
//! peer authority) to the caller. The transport layer wraps each stream
//! into a channel; the acceptor itself never reads a byte.
//!
//! `stop()` releases a blocked `accept` with `ServiceStopped` — that is how
//! the session's stop subscription tears down inbound I/O without owning
//! the accept loop.

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::authority::Authority;
use crate::config::NetworkSettings;
use crate::error::NetworkError;

/// A stoppable TCP accept resource.
pub struct Acceptor {
    settings: NetworkSettings,
    listener: Mutex<Option<TcpListener>>,
    stop: watch::Sender<bool>,
}

impl Acceptor {
    /// Creates an acceptor over a settings snapshot. Does not bind —
    /// call [`listen`](Self::listen) first.
    pub fn new(settings: NetworkSettings) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            settings,
            listener: Mutex::new(None),
            stop,
        }
    }

    /// Binds the configured inbound port.
    pub async fn listen(&self) -> Result<(), NetworkError> {
        let address = ("0.0.0.0", self.settings.inbound_port);
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        if let Ok(local) = listener.local_addr() {
            info!(address = %local, "acceptor listening");
        }
        *self.listener.lock().await = Some(listener);
        Ok(())
    }

    /// The bound local authority, once listening. Mainly useful when the
    /// configured port is `0` and the OS picked one.
    pub async fn local_authority(&self) -> Option<Authority> {
        let guard = self.listener.lock().await;
        guard
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
            .map(Authority::from)
    }

    /// Accepts one inbound connection.
    ///
    /// Fails with `OperationFailed` before `listen`, and resolves with
    /// `ServiceStopped` — even mid-wait — once [`stop`](Self::stop) fires.
    pub async fn accept(&self) -> Result<(TcpStream, Authority), NetworkError> {
        let mut stop_rx = self.stop.subscribe();
        if *stop_rx.borrow() {
            return Err(NetworkError::ServiceStopped);
        }

        let guard = self.listener.lock().await;
        let listener = guard.as_ref().ok_or(NetworkError::OperationFailed)?;

        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, address)) => Ok((stream, Authority::from(address))),
                Err(e) => Err(NetworkError::Transport(e.to_string())),
            },
            _ = stop_rx.changed() => Err(NetworkError::ServiceStopped),
        }
    }

    /// Releases any blocked accept and fails all future ones.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// True once stopped.
    pub fn stopped(&self) -> bool {
        *self.stop.borrow()
    }
}
