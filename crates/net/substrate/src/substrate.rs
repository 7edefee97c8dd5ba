use async_trait::async_trait;
use parley_primitives::{Connection, PeerAddress, PeerId, StreamProtocol};
use tokio::sync::broadcast;

use crate::{BoxedStream, IncomingStreams, SubstrateError};

/// Notifications about the substrate's connection set and own addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstrateEvent {
    ConnectionOpened(Connection),
    ConnectionClosed(Connection),
    /// The full current list of our own advertised addresses.
    AddressesUpdated(Vec<PeerAddress>),
}

/// The networking black box parley runs on.
///
/// Implementations never apply timeouts of their own; callers bound every
/// user-triggered operation.
#[async_trait]
pub trait Substrate: Send + Sync + 'static {
    fn local_peer_id(&self) -> PeerId;

    /// Open a new connection to `addr`.
    async fn dial(&self, addr: PeerAddress) -> Result<Connection, SubstrateError>;

    /// Open a stream for `protocol` to the peer named by `addr`, dialing
    /// first if no connection exists.
    async fn open_stream(
        &self,
        addr: PeerAddress,
        protocol: StreamProtocol,
    ) -> Result<BoxedStream, SubstrateError>;

    /// Start accepting inbound streams for `protocol`.
    ///
    /// Fails with [`SubstrateError::AlreadyRegistered`] on a second call for
    /// the same protocol.
    fn accept(&self, protocol: StreamProtocol) -> Result<IncomingStreams, SubstrateError>;

    /// Open connections, oldest first.
    fn connections(&self) -> Vec<Connection>;

    /// Our own advertised addresses.
    fn listen_addresses(&self) -> Vec<PeerAddress>;

    fn subscribe(&self) -> broadcast::Receiver<SubstrateEvent>;
}
