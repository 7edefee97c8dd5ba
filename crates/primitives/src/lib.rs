//! Core types shared across parley.
//!
//! - [`PeerAddress`] wraps a multiaddr and knows its [`TransportKind`]
//! - [`DirectoryKey`] is a validated SS58 address used as the directory key
//! - [`Connection`] is the substrate-level view of an open connection
//! - Protocol names used as wire-level routing keys

mod address;
mod connection;
mod key;
mod protocol;

pub use address::{AddressError, PeerAddress, TransportKind, classify, is_direct_capable};
pub use connection::{Connection, ConnectionId};
pub use key::{
    DirectoryKey, KeyViolation, MAX_KEY_LEN, MIN_KEY_LEN, SS58_ALPHABET, validate_directory_key,
};
pub use protocol::{CHAT_PROTOCOL, DIRECTORY_QUERY_PROTOCOL, DIRECTORY_STORE_PROTOCOL};

// Re-export commonly used libp2p types
pub use libp2p::{Multiaddr, PeerId, StreamProtocol};
