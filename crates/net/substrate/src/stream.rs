use core::fmt;

use futures::{
    io::{AsyncRead, AsyncWrite},
    stream::BoxStream,
};
use parley_primitives::PeerId;

/// An ordered bidirectional byte stream.
pub trait StreamIo: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> StreamIo for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A type-erased stream bound to one protocol.
pub type BoxedStream = Box<dyn StreamIo>;

/// A stream opened by a remote peer.
pub struct InboundStream {
    pub peer_id: PeerId,
    pub stream: BoxedStream,
}

impl fmt::Debug for InboundStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundStream")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

/// Inbound streams for one registered protocol.
pub type IncomingStreams = BoxStream<'static, InboundStream>;
