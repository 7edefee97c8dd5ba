use std::{path::PathBuf, time::Duration};

use libp2p::Multiaddr;

/// Default idle connection timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Swarm configuration.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Addresses to listen on at startup.
    pub listen_addrs: Vec<Multiaddr>,
    /// Addresses to advertise as externally reachable.
    pub external_addrs: Vec<Multiaddr>,
    /// Close connections without streams after this long.
    pub idle_timeout: Duration,
    /// Run the circuit relay server.
    pub relay_server: bool,
    /// Load or persist the identity here; ephemeral when `None`.
    pub identity_file: Option<PathBuf>,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_addrs: Self::default_listen_addrs(),
            external_addrs: Vec::new(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            relay_server: false,
            identity_file: None,
        }
    }
}

impl P2pConfig {
    /// TCP and WebRTC-direct on ephemeral ports.
    pub fn default_listen_addrs() -> Vec<Multiaddr> {
        ["/ip4/0.0.0.0/tcp/0", "/ip4/0.0.0.0/udp/0/webrtc-direct"]
            .into_iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }

    /// Configuration for a relay.
    pub fn relay() -> Self {
        Self {
            relay_server: true,
            ..Default::default()
        }
    }
}
