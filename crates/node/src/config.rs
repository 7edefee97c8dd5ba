use core::fmt;
use std::time::Duration;

/// Default bound on dialing a relay or a peer.
pub const DEFAULT_RELAY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on opening a chat stream.
pub const DEFAULT_CHAT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on each phase of a directory request.
pub const DEFAULT_DIRECTORY_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Static timeouts, read once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Relay bootstrap and any other dial.
    pub relay_connect: Duration,
    /// Opening the chat stream.
    pub chat_open: Duration,
    /// Opening a directory stream, and separately the exchange on it.
    pub directory_request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            relay_connect: DEFAULT_RELAY_CONNECT_TIMEOUT,
            chat_open: DEFAULT_CHAT_OPEN_TIMEOUT,
            directory_request: DEFAULT_DIRECTORY_REQUEST_TIMEOUT,
        }
    }
}

/// What a node serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeRole {
    /// Bootstraps to a relay and chats with other peers.
    #[default]
    Peer,
    /// Hosts the directory.
    Relay,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Peer => "peer",
            Self::Relay => "relay",
        })
    }
}
