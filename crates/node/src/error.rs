use std::time::Duration;

use parley_directory::DirectoryError;
use parley_net_codec::FrameError;
use parley_primitives::AddressError;

/// Failure of a dial or of the bootstrap sequence.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectivityError {
    #[error("no bootstrap relay configured")]
    NoBootstrapRelay,

    #[error("relay bootstrap already in progress")]
    AlreadyBootstrapping,

    #[error("dial timed out after {0:?}")]
    DialTimeout(Duration),

    #[error("dial failed: {0}")]
    DialFailed(String),

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("connectivity service stopped")]
    Stopped,
}

/// Failure of a chat send.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("no direct peer address known")]
    NoDirectAddress,

    #[error("timed out opening chat stream after {0:?}")]
    OpenTimeout(Duration),

    #[error("failed to open chat stream: {0}")]
    OpenFailed(String),

    #[error("failed to write chat message: {0}")]
    Write(#[source] FrameError),
}

/// Failure of a composite node operation.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("no direct-capable address to publish")]
    NoDirectAddress,

    #[error("failed to register protocol handler: {0}")]
    Register(#[from] parley_net_substrate::SubstrateError),
}
