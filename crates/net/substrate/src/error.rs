use std::time::Duration;

use parley_primitives::{PeerAddress, PeerId, StreamProtocol};

/// Errors reported by a substrate implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubstrateError {
    #[error("protocol {0} already has a handler")]
    AlreadyRegistered(StreamProtocol),

    #[error("address {0} does not name a peer")]
    MissingPeerId(PeerAddress),

    #[error("dial {addr} failed: {reason}")]
    Dial { addr: PeerAddress, reason: String },

    #[error("opening {protocol} stream to {peer} failed: {reason}")]
    OpenStream {
        peer: PeerId,
        protocol: StreamProtocol,
        reason: String,
    },

    #[error("substrate is shut down")]
    Shutdown,
}

/// Failure opening an outbound stream through the [`Multiplexer`](crate::Multiplexer).
#[derive(Debug, Clone, thiserror::Error)]
pub enum OpenError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Failed(#[from] SubstrateError),
}
