//! Stream protocol names.
//!
//! These are stable identifiers negotiated on every stream; changing them
//! breaks compatibility with deployed relays and peers.

use libp2p::StreamProtocol;

/// Free-form chat between two directly connected peers.
pub const CHAT_PROTOCOL: StreamProtocol = StreamProtocol::new("/libp2p/examples/chat/1.0.0");

/// Store an SS58 address to peer address mapping on the relay.
pub const DIRECTORY_STORE_PROTOCOL: StreamProtocol =
    StreamProtocol::new("/libp2p/examples/kv/1.0.0");

/// Look up an SS58 address on the relay.
pub const DIRECTORY_QUERY_PROTOCOL: StreamProtocol =
    StreamProtocol::new("/libp2p/examples/kv-query/1.0.0");
