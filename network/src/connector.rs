//! # Outbound Connector
//!
//! Dials peers under the configured connect timeout and hands the raw
//! stream to the caller. Like the acceptor, `stop()` releases any dial in
//! flight — the session's stop subscription uses it to cut outbound I/O
//! loose when the network winds down.

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::authority::Authority;
use crate::config::NetworkSettings;
use crate::error::NetworkError;

/// A stoppable TCP dial resource.
pub struct Connector {
    settings: NetworkSettings,
    stop: watch::Sender<bool>,
}

impl Connector {
    /// Creates a connector over a settings snapshot.
    pub fn new(settings: NetworkSettings) -> Self {
        let (stop, _) = watch::channel(false);
        Self { settings, stop }
    }

    /// Dials `authority`, giving up after the configured connect timeout.
    ///
    /// Resolves with `ServiceStopped` — even mid-dial — once
    /// [`stop`](Self::stop) fires.
    pub async fn connect(&self, authority: &Authority) -> Result<TcpStream, NetworkError> {
        let mut stop_rx = self.stop.subscribe();
        if *stop_rx.borrow() {
            return Err(NetworkError::ServiceStopped);
        }

        let dial = TcpStream::connect(authority.to_socket_addr());

        tokio::select! {
            dialed = timeout(self.settings.connect_timeout, dial) => match dialed {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(NetworkError::Transport(e.to_string())),
                Err(_) => Err(NetworkError::ChannelTimeout),
            },
            _ = stop_rx.changed() => Err(NetworkError::ServiceStopped),
        }
    }

    /// Releases any dial in flight and fails all future ones.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// True once stopped.
    pub fn stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_a_listener() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let authority = Authority::from(listener.local_addr().unwrap());

        let connector = Connector::new(NetworkSettings::default());
        let stream = connector.connect(&authority).await.unwrap();
        assert!(stream.peer_addr().is_ok());
    }

    #[tokio::test]
    async fn stopped_connector_refuses_to_dial() {
        let connector = Connector::new(NetworkSettings::default());
        connector.stop();

        let authority: Authority = "127.0.0.1:1".parse().unwrap();
        assert_eq!(
            connector.connect(&authority).await.unwrap_err(),
            NetworkError::ServiceStopped
        );
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        // Bind a listener, grab its port, then drop it so the port is dead.
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let authority = Authority::from(listener.local_addr().unwrap());
        drop(listener);

        let connector = Connector::new(NetworkSettings::default());
        match connector.connect(&authority).await {
            Err(NetworkError::Transport(_)) | Err(NetworkError::ChannelTimeout) => {}
            other => panic!("expected a transport failure, got {:?}", other),
        }
    }
}
