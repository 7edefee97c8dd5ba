//! Handle to the running swarm task.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use parley_net_substrate::{
    BoxedStream, InboundStream, IncomingStreams, Substrate, SubstrateError, SubstrateEvent,
};
use parley_primitives::{Connection, PeerAddress, PeerId, StreamProtocol};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

/// Commands sent from handles to the swarm task.
#[derive(Debug)]
pub(crate) enum Command {
    Dial {
        addr: PeerAddress,
        reply: oneshot::Sender<Result<Connection, SubstrateError>>,
    },
    Shutdown,
}

/// State published by the swarm task and read by handles.
pub(crate) struct Shared {
    pub(crate) local_peer_id: PeerId,
    pub(crate) connections: RwLock<Vec<Connection>>,
    pub(crate) addresses: RwLock<Vec<PeerAddress>>,
    pub(crate) events: broadcast::Sender<SubstrateEvent>,
}

impl Shared {
    pub(crate) fn emit(&self, event: SubstrateEvent) {
        let _ = self.events.send(event);
    }
}

/// Cloneable handle to a [`P2pNode`](crate::P2pNode).
#[derive(Clone)]
pub struct P2pHandle {
    command_tx: mpsc::Sender<Command>,
    control: libp2p_stream::Control,
    shared: Arc<Shared>,
}

impl P2pHandle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<Command>,
        control: libp2p_stream::Control,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            command_tx,
            control,
            shared,
        }
    }

    /// Ask the swarm task to stop.
    pub async fn shutdown(&self) {
        if self.command_tx.send(Command::Shutdown).await.is_err() {
            debug!("Swarm task already stopped");
        }
    }

    fn is_connected(&self, peer: &PeerId) -> bool {
        self.shared
            .connections
            .read()
            .iter()
            .any(|c| &c.peer_id == peer)
    }
}

#[async_trait]
impl Substrate for P2pHandle {
    fn local_peer_id(&self) -> PeerId {
        self.shared.local_peer_id
    }

    async fn dial(&self, addr: PeerAddress) -> Result<Connection, SubstrateError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Dial { addr, reply })
            .await
            .map_err(|_| SubstrateError::Shutdown)?;
        rx.await.map_err(|_| SubstrateError::Shutdown)?
    }

    async fn open_stream(
        &self,
        addr: PeerAddress,
        protocol: StreamProtocol,
    ) -> Result<BoxedStream, SubstrateError> {
        let peer = addr
            .peer_id()
            .ok_or_else(|| SubstrateError::MissingPeerId(addr.clone()))?;

        if !self.is_connected(&peer) {
            self.dial(addr).await?;
        }

        let mut control = self.control.clone();
        let stream = control
            .open_stream(peer, protocol.clone())
            .await
            .map_err(|e| SubstrateError::OpenStream {
                peer,
                protocol,
                reason: e.to_string(),
            })?;
        Ok(Box::new(stream))
    }

    fn accept(&self, protocol: StreamProtocol) -> Result<IncomingStreams, SubstrateError> {
        let mut control = self.control.clone();
        let incoming = control
            .accept(protocol.clone())
            .map_err(|_| SubstrateError::AlreadyRegistered(protocol))?;
        Ok(incoming
            .map(|(peer_id, stream)| InboundStream {
                peer_id,
                stream: Box::new(stream),
            })
            .boxed())
    }

    fn connections(&self) -> Vec<Connection> {
        self.shared.connections.read().clone()
    }

    fn listen_addresses(&self) -> Vec<PeerAddress> {
        self.shared.addresses.read().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SubstrateEvent> {
        self.shared.events.subscribe()
    }
}
