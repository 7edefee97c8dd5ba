//! In-process substrate.
//!
//! A [`MemoryNetwork`] is a hub that routes dials by address. Nodes created on
//! it are registered under their advertised addresses. Streams are
//! [`tokio::io::duplex`] pipes. A blackholed address accepts the dial and
//! never answers, which is how timeout behaviour is exercised.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::multiaddr::Protocol;
use parking_lot::Mutex;
use parley_primitives::{
    Connection, ConnectionId, Multiaddr, PeerAddress, PeerId, StreamProtocol, TransportKind,
};
use tokio::sync::{broadcast, mpsc};
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::trace;

use crate::{
    BoxedStream, InboundStream, IncomingStreams, Substrate, SubstrateError, SubstrateEvent,
};

const EVENT_CAPACITY: usize = 256;
const PIPE_CAPACITY: usize = 64 * 1024;
const ACCEPT_BACKLOG: usize = 16;

#[derive(Default)]
struct Hub {
    nodes: HashMap<PeerId, Arc<NodeShared>>,
    routes: HashMap<Multiaddr, PeerId>,
    blackholes: HashSet<Multiaddr>,
    next_connection: u64,
}

struct NodeShared {
    peer_id: PeerId,
    events: broadcast::Sender<SubstrateEvent>,
    state: Mutex<NodeState>,
}

#[derive(Default)]
struct NodeState {
    connections: Vec<Connection>,
    addresses: Vec<PeerAddress>,
    handlers: HashMap<StreamProtocol, mpsc::Sender<InboundStream>>,
}

impl NodeShared {
    fn emit(&self, event: SubstrateEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Route key: the address without its terminal peer id.
fn route_key(addr: &PeerAddress) -> Multiaddr {
    let mut key = addr.as_multiaddr().clone();
    if matches!(key.iter().last(), Some(Protocol::P2p(_))) {
        key.pop();
    }
    key
}

/// The address a listener sees for an inbound connection of `kind`.
fn inbound_address(kind: TransportKind, n: u64) -> PeerAddress {
    let base = Multiaddr::empty().with(Protocol::Memory(n));
    PeerAddress::new(match kind {
        TransportKind::DirectCapable => base.with(Protocol::WebRTCDirect),
        TransportKind::Relayed => base.with(Protocol::P2pCircuit),
        TransportKind::RendezvousOnly => base,
    })
}

/// Shared in-process network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node listening on `addrs`, with a random peer id.
    ///
    /// # Panics
    ///
    /// If any address fails to parse.
    pub fn node<I>(&self, addrs: I) -> MemoryNode
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let peer_id = PeerId::random();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(NodeShared {
            peer_id,
            events,
            state: Mutex::new(NodeState::default()),
        });
        self.hub.lock().nodes.insert(peer_id, shared.clone());

        let node = MemoryNode {
            shared,
            hub: self.hub.clone(),
        };
        let addrs = addrs
            .into_iter()
            .map(|a| {
                a.as_ref()
                    .parse::<PeerAddress>()
                    .unwrap_or_else(|e| panic!("invalid memory address: {e}"))
            })
            .collect();
        node.set_advertised_addresses(addrs);
        node
    }

    /// Make dials to `addr` hang forever.
    pub fn blackhole(&self, addr: &PeerAddress) {
        self.hub.lock().blackholes.insert(route_key(addr));
    }
}

/// One node on a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryNode {
    shared: Arc<NodeShared>,
    hub: Arc<Mutex<Hub>>,
}

enum Route {
    Peer(Arc<NodeShared>),
    Blackhole,
}

impl MemoryNode {
    /// Replace the advertised address list and emit an address update.
    ///
    /// Each address gains this node's `/p2p/<id>` suffix and becomes dialable.
    pub fn set_advertised_addresses(&self, addrs: Vec<PeerAddress>) {
        let addrs: Vec<PeerAddress> = addrs
            .into_iter()
            .map(|a| a.with_peer_id(self.shared.peer_id))
            .collect();
        {
            let mut hub = self.hub.lock();
            for addr in &addrs {
                hub.routes.insert(route_key(addr), self.shared.peer_id);
            }
        }
        self.shared.state.lock().addresses = addrs.clone();
        self.shared.emit(SubstrateEvent::AddressesUpdated(addrs));
    }

    /// Append one advertised address.
    pub fn add_advertised_address(&self, addr: PeerAddress) {
        let mut addrs = self.shared.state.lock().addresses.clone();
        addrs.push(addr);
        self.set_advertised_addresses(addrs);
    }

    /// Close every connection between this node and `peer`.
    pub fn disconnect(&self, peer: PeerId) {
        let remote = self.hub.lock().nodes.get(&peer).cloned();

        let closed: Vec<Connection> = {
            let mut state = self.shared.state.lock();
            let (closed, kept): (Vec<_>, Vec<_>) =
                state.connections.drain(..).partition(|c| c.peer_id == peer);
            state.connections = kept;
            closed
        };
        for conn in closed {
            trace!(%conn, "Memory connection closed");
            self.shared.emit(SubstrateEvent::ConnectionClosed(conn));
        }

        if let Some(remote) = remote {
            let closed: Vec<Connection> = {
                let mut state = remote.state.lock();
                let (closed, kept): (Vec<_>, Vec<_>) = state
                    .connections
                    .drain(..)
                    .partition(|c| c.peer_id == self.shared.peer_id);
                state.connections = kept;
                closed
            };
            for conn in closed {
                remote.emit(SubstrateEvent::ConnectionClosed(conn));
            }
        }
    }

    fn route(&self, addr: &PeerAddress) -> Result<Route, SubstrateError> {
        let fail = |reason: &str| SubstrateError::Dial {
            addr: addr.clone(),
            reason: reason.to_string(),
        };

        let hub = self.hub.lock();
        let key = route_key(addr);
        if hub.blackholes.contains(&key) {
            return Ok(Route::Blackhole);
        }
        let peer = *hub.routes.get(&key).ok_or_else(|| fail("no route to address"))?;
        if addr.peer_id().is_some_and(|expected| expected != peer) {
            return Err(fail("peer id mismatch"));
        }
        if peer == self.shared.peer_id {
            return Err(fail("cannot dial self"));
        }
        hub.nodes
            .get(&peer)
            .cloned()
            .map(Route::Peer)
            .ok_or_else(|| fail("peer is gone"))
    }

    fn connect(&self, remote: &NodeShared, addr: PeerAddress) -> Connection {
        let n = {
            let mut hub = self.hub.lock();
            let n = hub.next_connection;
            hub.next_connection += 2;
            n
        };

        let outbound = Connection::new(
            ConnectionId::new(n),
            remote.peer_id,
            addr.with_peer_id(remote.peer_id),
        );
        let inbound = Connection::new(
            ConnectionId::new(n + 1),
            self.shared.peer_id,
            inbound_address(outbound.kind(), n + 1),
        );

        self.shared
            .state
            .lock()
            .connections
            .push(outbound.clone());
        remote.state.lock().connections.push(inbound.clone());

        trace!(%outbound, "Memory connection opened");
        self.shared
            .emit(SubstrateEvent::ConnectionOpened(outbound.clone()));
        remote.emit(SubstrateEvent::ConnectionOpened(inbound));
        outbound
    }
}

#[async_trait]
impl Substrate for MemoryNode {
    fn local_peer_id(&self) -> PeerId {
        self.shared.peer_id
    }

    async fn dial(&self, addr: PeerAddress) -> Result<Connection, SubstrateError> {
        match self.route(&addr)? {
            Route::Peer(remote) => Ok(self.connect(&remote, addr)),
            Route::Blackhole => futures::future::pending().await,
        }
    }

    async fn open_stream(
        &self,
        addr: PeerAddress,
        protocol: StreamProtocol,
    ) -> Result<BoxedStream, SubstrateError> {
        let peer = addr
            .peer_id()
            .ok_or_else(|| SubstrateError::MissingPeerId(addr.clone()))?;

        let connected = self
            .shared
            .state
            .lock()
            .connections
            .iter()
            .any(|c| c.peer_id == peer);
        if !connected {
            self.dial(addr).await?;
        }

        let fail = |reason: &str| SubstrateError::OpenStream {
            peer,
            protocol: protocol.clone(),
            reason: reason.to_string(),
        };
        let remote = self
            .hub
            .lock()
            .nodes
            .get(&peer)
            .cloned()
            .ok_or_else(|| fail("peer is gone"))?;
        let handler = remote
            .state
            .lock()
            .handlers
            .get(&protocol)
            .cloned()
            .ok_or_else(|| fail("protocol not supported"))?;

        let (local, far) = tokio::io::duplex(PIPE_CAPACITY);
        handler
            .send(InboundStream {
                peer_id: self.shared.peer_id,
                stream: Box::new(far.compat()),
            })
            .await
            .map_err(|_| fail("protocol not supported"))?;
        Ok(Box::new(local.compat()))
    }

    fn accept(&self, protocol: StreamProtocol) -> Result<IncomingStreams, SubstrateError> {
        let mut state = self.shared.state.lock();
        if state.handlers.contains_key(&protocol) {
            return Err(SubstrateError::AlreadyRegistered(protocol));
        }
        let (tx, mut rx) = mpsc::channel(ACCEPT_BACKLOG);
        state.handlers.insert(protocol, tx);
        Ok(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed())
    }

    fn connections(&self) -> Vec<Connection> {
        self.shared.state.lock().connections.clone()
    }

    fn listen_addresses(&self) -> Vec<PeerAddress> {
        self.shared.state.lock().addresses.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SubstrateEvent> {
        self.shared.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_dial_emits_on_both_sides() {
        let net = MemoryNetwork::new();
        let a = net.node(["/ip4/10.0.0.1/tcp/1"]);
        let b = net.node(["/ip4/10.0.0.2/udp/2/webrtc-direct"]);
        let mut a_events = a.subscribe();
        let mut b_events = b.subscribe();

        let conn = a.dial(b.listen_addresses()[0].clone()).await.unwrap();
        assert_eq!(conn.peer_id, b.local_peer_id());
        assert!(conn.is_direct_capable());

        assert_matches!(a_events.recv().await, Ok(SubstrateEvent::ConnectionOpened(c)) if c == conn);
        assert_matches!(
            b_events.recv().await,
            Ok(SubstrateEvent::ConnectionOpened(c)) if c.peer_id == a.local_peer_id() && c.is_direct_capable()
        );
        assert_eq!(a.connections(), vec![conn]);
        assert_eq!(b.connections().len(), 1);
    }

    #[tokio::test]
    async fn test_dial_unknown_fails_fast() {
        let net = MemoryNetwork::new();
        let a = net.node(["/ip4/10.0.0.1/tcp/1"]);
        let unknown: PeerAddress = "/ip4/10.9.9.9/tcp/9".parse().unwrap();
        assert_matches!(a.dial(unknown).await, Err(SubstrateError::Dial { .. }));
        assert!(a.connections().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_closes_both_sides() {
        let net = MemoryNetwork::new();
        let a = net.node(["/ip4/10.0.0.1/tcp/1"]);
        let b = net.node(["/ip4/10.0.0.2/tcp/2"]);
        a.dial(b.listen_addresses()[0].clone()).await.unwrap();

        let mut b_events = b.subscribe();
        a.disconnect(b.local_peer_id());
        assert!(a.connections().is_empty());
        assert!(b.connections().is_empty());
        assert_matches!(b_events.recv().await, Ok(SubstrateEvent::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn test_accept_twice_rejected() {
        let net = MemoryNetwork::new();
        let a = net.node(["/ip4/10.0.0.1/tcp/1"]);
        let proto = StreamProtocol::new("/test/1");
        let _incoming = a.accept(proto.clone()).unwrap();
        assert_matches!(a.accept(proto).map(|_| ()), Err(SubstrateError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn test_advertised_addresses_carry_peer_id() {
        let net = MemoryNetwork::new();
        let a = net.node(Vec::<&str>::new());
        let mut events = a.subscribe();
        a.add_advertised_address("/ip4/10.0.0.1/udp/1/webrtc-direct".parse().unwrap());

        let addrs = a.listen_addresses();
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].peer_id(), Some(a.local_peer_id()));
        assert_matches!(events.recv().await, Ok(SubstrateEvent::AddressesUpdated(list)) if list == addrs);
    }
}
