//! # Peer Authority
//!
//! An [`Authority`] is a peer's network identity: the IP address and port we
//! know it by. Authorities key the connected-channel map, drive blacklist
//! checks, and show up in every per-channel log line, so they are cheap to
//! copy and render as the familiar `ip:port` form.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A peer's network identity (address + port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Authority {
    /// IP address of the peer.
    ip: IpAddr,
    /// TCP port of the peer.
    port: u16,
}

impl Authority {
    /// Creates an authority from an address and port.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// The unspecified IPv4 authority, used as a placeholder in locally
    /// constructed version messages.
    pub fn unspecified() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
        }
    }

    /// Returns the IP address.
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Converts to a `SocketAddr` for dialing.
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl From<SocketAddr> for Authority {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(v4) => write!(f, "{}:{}", v4, self.port),
            IpAddr::V6(v6) => write!(f, "[{}]:{}", v6, self.port),
        }
    }
}

impl FromStr for Authority {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SocketAddr::from_str(s).map(Authority::from)
    }
}
