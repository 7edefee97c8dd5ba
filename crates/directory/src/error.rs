use std::time::Duration;

use parley_net_codec::FrameError;
use parley_primitives::KeyViolation;

/// Outcome of a failed directory request.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("invalid SS58 address: {0}")]
    InvalidKey(#[from] KeyViolation),

    #[error("No relay connection found")]
    NoRelay,

    #[error("timed out opening stream to relay after {0:?}")]
    OpenTimeout(Duration),

    #[error("failed to open stream to relay: {0}")]
    OpenFailed(String),

    #[error("relay closed the stream without responding")]
    NoResponse,

    #[error("relay did not respond within {0:?}")]
    ResponseTimeout(Duration),

    #[error("malformed response from relay: {0}")]
    MalformedResponse(String),

    #[error("relay rejected the request: {0}")]
    Rejected(String),

    #[error("stream error: {0}")]
    Stream(#[source] FrameError),
}

/// Failure of [`DirectoryClient::store`](crate::DirectoryClient::store).
pub type StoreError = DirectoryError;

/// Failure of [`DirectoryClient::query`](crate::DirectoryClient::query).
pub type QueryError = DirectoryError;
