use std::net::{Ipv4Addr, SocketAddr};

use serde::Deserialize;

/// Port the dealer listens on unless configured otherwise.
pub const DEFAULT_DEALER_PORT: u16 = 31337;

/// Port the listening online peer uses unless configured otherwise.
pub const DEFAULT_PEER_PORT: u16 = 31338;

/// Addresses of the dealer and the listening online peer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(default = "default_dealer_addr")]
    pub dealer: SocketAddr,
    #[serde(default = "default_peer_addr")]
    pub peer: SocketAddr,
    /// Disable Nagle's algorithm on every connection.
    #[serde(default)]
    pub nodelay: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            dealer: default_dealer_addr(),
            peer: default_peer_addr(),
            nodelay: false,
        }
    }
}

fn default_dealer_addr() -> SocketAddr {
    (Ipv4Addr::LOCALHOST, DEFAULT_DEALER_PORT).into()
}

fn default_peer_addr() -> SocketAddr {
    (Ipv4Addr::LOCALHOST, DEFAULT_PEER_PORT).into()
}
