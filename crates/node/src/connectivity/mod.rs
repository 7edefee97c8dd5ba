//! Connectivity state machine.
//!
//! ```text
//! Isolated ──bootstrap──▶ RelayBootstrapping ──dial ok──▶ RelayConnected
//!    ▲                          │                              │
//!    └────────dial failed───────┘                              │
//!    └────────────────last relay connection closed─────────────┘
//! ```
//!
//! Being directly connected is a flag on top of the state, not a state of its
//! own: a node keeps its relay connection while it holds direct ones.
//!
//! [`Connectivity`] is the pure machine. [`ConnectivityService`] owns one and
//! feeds it substrate events; everyone else reads published snapshots through
//! a [`ConnectivityHandle`].

mod handle;
mod service;

use core::fmt;

use parley_primitives::{Connection, PeerAddress};

pub use handle::ConnectivityHandle;
pub(crate) use service::ConnectivityService;

use crate::{ConnectivityError, NodeEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    #[default]
    Isolated,
    RelayBootstrapping,
    RelayConnected,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Isolated => "isolated",
            Self::RelayBootstrapping => "relay-bootstrapping",
            Self::RelayConnected => "relay-connected",
        })
    }
}

/// Immutable view of the connectivity state, published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivitySnapshot {
    pub state: ConnectivityState,
    /// Open connections in open order.
    pub connections: Vec<Connection>,
    /// Whether any open connection is direct-capable.
    pub direct_path: bool,
    /// Dialable address of the most recently opened direct-capable connection.
    pub best_peer: Option<PeerAddress>,
    /// Every address we advertise.
    pub addresses: Vec<PeerAddress>,
    /// The direct-capable subset of `addresses`. This is what gets published.
    pub direct_addresses: Vec<PeerAddress>,
}

impl ConnectivitySnapshot {
    /// The earliest-opened connection that is not direct-capable.
    pub fn relay_connection(&self) -> Option<&Connection> {
        self.connections.iter().find(|c| !c.is_direct_capable())
    }

    pub fn is_directly_connected(&self) -> bool {
        self.direct_path
    }
}

/// The connectivity state machine. Every transition returns the events it caused.
#[derive(Debug, Default)]
pub struct Connectivity {
    snapshot: ConnectivitySnapshot,
}

impl Connectivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectivityState {
        self.snapshot.state
    }

    pub fn snapshot(&self) -> &ConnectivitySnapshot {
        &self.snapshot
    }

    /// Enter `RelayBootstrapping`. A connected node stays connected while it redials.
    pub fn begin_bootstrap(&mut self) -> Result<Vec<NodeEvent>, ConnectivityError> {
        match self.snapshot.state {
            ConnectivityState::RelayBootstrapping => Err(ConnectivityError::AlreadyBootstrapping),
            ConnectivityState::RelayConnected => Ok(Vec::new()),
            ConnectivityState::Isolated => {
                Ok(self.set_state(ConnectivityState::RelayBootstrapping).into_iter().collect())
            }
        }
    }

    /// The bootstrap dial produced `conn`.
    pub fn bootstrap_succeeded(&mut self, conn: Connection) -> Vec<NodeEvent> {
        let mut events = self.connection_opened(conn.clone());
        events.extend(self.set_state(ConnectivityState::RelayConnected));
        events.push(NodeEvent::RelayReady(conn));
        events
    }

    /// The bootstrap dial failed or timed out.
    pub fn bootstrap_failed(&mut self) -> Vec<NodeEvent> {
        if self.snapshot.state != ConnectivityState::RelayBootstrapping {
            return Vec::new();
        }
        self.set_state(ConnectivityState::Isolated).into_iter().collect()
    }

    pub fn connection_opened(&mut self, conn: Connection) -> Vec<NodeEvent> {
        if self.snapshot.connections.iter().any(|c| c.id == conn.id) {
            return Vec::new();
        }
        self.snapshot.connections.push(conn);
        self.connections_changed()
    }

    pub fn connection_closed(&mut self, conn: &Connection) -> Vec<NodeEvent> {
        let before = self.snapshot.connections.len();
        self.snapshot.connections.retain(|c| c.id != conn.id);
        if self.snapshot.connections.len() == before {
            return Vec::new();
        }
        self.connections_changed()
    }

    /// Replace our advertised address list.
    pub fn addresses_updated(&mut self, addresses: Vec<PeerAddress>) -> Vec<NodeEvent> {
        let direct: Vec<PeerAddress> = addresses
            .iter()
            .filter(|a| a.is_direct_capable())
            .cloned()
            .collect();
        self.snapshot.addresses = addresses;
        if direct == self.snapshot.direct_addresses {
            return Vec::new();
        }
        self.snapshot.direct_addresses = direct.clone();
        vec![NodeEvent::AddressesChanged(direct)]
    }

    /// Replace the whole connection set, e.g. after missing events.
    pub fn resync(
        &mut self,
        connections: Vec<Connection>,
        addresses: Vec<PeerAddress>,
    ) -> Vec<NodeEvent> {
        let mut events = Vec::new();
        if connections != self.snapshot.connections {
            self.snapshot.connections = connections;
            events.extend(self.connections_changed());
        }
        events.extend(self.addresses_updated(addresses));
        events
    }

    fn connections_changed(&mut self) -> Vec<NodeEvent> {
        let mut events = vec![NodeEvent::ConnectionsChanged(
            self.snapshot.connections.clone(),
        )];

        let best_peer = self
            .snapshot
            .connections
            .iter()
            .rev()
            .find(|c| c.is_direct_capable())
            .map(|c| c.remote_addr.clone().with_peer_id(c.peer_id));
        let available = best_peer.is_some();
        if available != self.snapshot.direct_path || best_peer != self.snapshot.best_peer {
            self.snapshot.direct_path = available;
            self.snapshot.best_peer = best_peer.clone();
            events.push(NodeEvent::DirectPathChanged {
                available,
                best_peer,
            });
        }

        if self.snapshot.state == ConnectivityState::RelayConnected
            && self.snapshot.relay_connection().is_none()
        {
            events.extend(self.set_state(ConnectivityState::Isolated));
            events.push(NodeEvent::RelayLost);
        }
        events
    }

    fn set_state(&mut self, state: ConnectivityState) -> Option<NodeEvent> {
        if self.snapshot.state == state {
            return None;
        }
        self.snapshot.state = state;
        Some(NodeEvent::StateChanged(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parley_primitives::{ConnectionId, PeerId};

    fn conn(id: u64, addr: &str) -> Connection {
        Connection::new(ConnectionId::new(id), PeerId::random(), addr.parse().unwrap())
    }

    fn relay_conn(id: u64) -> Connection {
        conn(id, "/ip4/10.0.0.1/tcp/4001")
    }

    fn direct_conn(id: u64) -> Connection {
        conn(id, "/ip4/10.0.0.2/udp/9/webrtc-direct")
    }

    fn bootstrapped() -> Connectivity {
        let mut c = Connectivity::new();
        c.begin_bootstrap().unwrap();
        c.bootstrap_succeeded(relay_conn(1));
        c
    }

    #[test]
    fn test_bootstrap_success() {
        let mut c = Connectivity::new();
        assert_eq!(c.state(), ConnectivityState::Isolated);

        assert_eq!(
            c.begin_bootstrap().unwrap(),
            vec![NodeEvent::StateChanged(ConnectivityState::RelayBootstrapping)]
        );
        assert_matches!(
            c.begin_bootstrap(),
            Err(ConnectivityError::AlreadyBootstrapping)
        );

        let relay = relay_conn(1);
        let events = c.bootstrap_succeeded(relay.clone());
        assert!(events.contains(&NodeEvent::StateChanged(ConnectivityState::RelayConnected)));
        assert_eq!(events.last(), Some(&NodeEvent::RelayReady(relay.clone())));
        assert_eq!(c.snapshot().relay_connection(), Some(&relay));
        assert!(!c.snapshot().direct_path);
    }

    #[test]
    fn test_bootstrap_failure_returns_to_isolated() {
        let mut c = Connectivity::new();
        c.begin_bootstrap().unwrap();
        assert_eq!(
            c.bootstrap_failed(),
            vec![NodeEvent::StateChanged(ConnectivityState::Isolated)]
        );
        // Retrigger is allowed.
        c.begin_bootstrap().unwrap();
    }

    #[test]
    fn test_bootstrap_event_and_dial_result_dedupe() {
        let mut c = Connectivity::new();
        c.begin_bootstrap().unwrap();
        let relay = relay_conn(1);
        c.connection_opened(relay.clone());
        c.bootstrap_succeeded(relay);
        assert_eq!(c.snapshot().connections.len(), 1);
    }

    #[test]
    fn test_direct_flag_is_additive() {
        let mut c = bootstrapped();
        let direct = direct_conn(2);
        let events = c.connection_opened(direct.clone());

        assert_matches!(
            events.as_slice(),
            [
                NodeEvent::ConnectionsChanged(_),
                NodeEvent::DirectPathChanged { available: true, best_peer: Some(_) }
            ]
        );
        assert_eq!(c.state(), ConnectivityState::RelayConnected);
        assert!(c.snapshot().is_directly_connected());
        assert_eq!(
            c.snapshot().best_peer,
            Some(direct.remote_addr.clone().with_peer_id(direct.peer_id))
        );
    }

    #[test]
    fn test_best_peer_is_most_recent_direct() {
        let mut c = bootstrapped();
        c.connection_opened(direct_conn(2));
        let newer = conn(3, "/ip4/10.0.0.3/udp/9/webrtc-direct");
        c.connection_opened(newer.clone());
        assert_eq!(c.snapshot().best_peer.as_ref().and_then(|a| a.peer_id()), Some(newer.peer_id));

        c.connection_closed(&newer);
        assert!(c.snapshot().direct_path);
        assert_ne!(c.snapshot().best_peer.as_ref().and_then(|a| a.peer_id()), Some(newer.peer_id));
    }

    #[test]
    fn test_relay_connection_is_earliest_non_direct() {
        let mut c = Connectivity::new();
        c.connection_opened(direct_conn(1));
        let first = relay_conn(2);
        c.connection_opened(first.clone());
        c.connection_opened(conn(3, "/ip4/10.0.0.1/tcp/4001/p2p-circuit"));
        assert_eq!(c.snapshot().relay_connection(), Some(&first));
    }

    #[test]
    fn test_losing_last_relay() {
        let mut c = bootstrapped();
        c.connection_opened(direct_conn(2));
        let relay = c.snapshot().connections[0].clone();

        let events = c.connection_closed(&relay);
        assert!(events.contains(&NodeEvent::RelayLost));
        assert_eq!(c.state(), ConnectivityState::Isolated);
        // The direct path survives the relay.
        assert!(c.snapshot().direct_path);
    }

    #[test]
    fn test_close_unknown_is_noop() {
        let mut c = bootstrapped();
        assert!(c.connection_closed(&relay_conn(99)).is_empty());
        assert_eq!(c.state(), ConnectivityState::RelayConnected);
    }

    #[test]
    fn test_addresses_filtered_to_direct() {
        let mut c = Connectivity::new();
        let direct: PeerAddress = "/ip4/1.2.3.4/udp/9/webrtc-direct".parse().unwrap();
        let events = c.addresses_updated(vec![
            "/ip4/1.2.3.4/tcp/1".parse().unwrap(),
            "/ip4/10.0.0.1/tcp/4001/p2p-circuit/webrtc".parse().unwrap(),
            direct.clone(),
        ]);
        assert_eq!(events, vec![NodeEvent::AddressesChanged(vec![direct.clone()])]);
        assert_eq!(c.snapshot().addresses.len(), 3);

        // Same direct subset, no event.
        assert!(c.addresses_updated(vec![direct]).is_empty());
    }
}
