//! Substrate-level connection descriptors.

use core::fmt;

use libp2p::PeerId;

use crate::{PeerAddress, TransportKind};

/// Opaque handle for one connection, unique for the lifetime of a substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// An open connection as reported by the substrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub peer_id: PeerId,
    pub remote_addr: PeerAddress,
}

impl Connection {
    pub fn new(id: ConnectionId, peer_id: PeerId, remote_addr: PeerAddress) -> Self {
        Self {
            id,
            peer_id,
            remote_addr,
        }
    }

    /// Transport classification of the remote address.
    pub fn kind(&self) -> TransportKind {
        self.remote_addr.kind()
    }

    pub fn is_direct_capable(&self) -> bool {
        self.remote_addr.is_direct_capable()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} via {} ({})", self.id, self.peer_id, self.remote_addr, self.kind())
    }
}
