//! Typed node notifications.
//!
//! Every observer gets its own [`broadcast`](tokio::sync::broadcast) receiver
//! from [`Node::subscribe`](crate::Node::subscribe). A slow observer lags and
//! loses events. It never blocks the node.

use parley_primitives::{Connection, PeerAddress, PeerId};

use crate::ConnectivityState;

/// Capacity of the node event channel.
pub(crate) const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// The connectivity state machine moved.
    StateChanged(ConnectivityState),
    /// The bootstrap dial succeeded.
    RelayReady(Connection),
    /// The last relay connection closed.
    RelayLost,
    /// The open connection set changed. Carries the full set in open order.
    ConnectionsChanged(Vec<Connection>),
    /// The direct-path flag or the best peer address changed.
    DirectPathChanged {
        available: bool,
        best_peer: Option<PeerAddress>,
    },
    /// Our own direct-capable addresses changed.
    AddressesChanged(Vec<PeerAddress>),
    ChatOpened { peer: PeerId },
    ChatClosed { peer: PeerId },
    /// An inbound chat stream arrived while a session was active and was closed.
    ChatRejected { peer: PeerId },
    ChatMessage { peer: PeerId, text: String },
}
