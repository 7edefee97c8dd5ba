use std::io;

/// Errors from encoding or decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("message of {size} bytes exceeds limit of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("stream ended inside a message ({0} bytes left over)")]
    Truncated(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// True when the peer sent bytes that are not a valid message, as opposed
    /// to the stream itself failing.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}
