//! A parley node.
//!
//! [`NodeBuilder`] wires a [`Substrate`](parley_net_substrate::Substrate)
//! into a [`Node`]: the protocol multiplexer, the connectivity state machine,
//! the chat session and the directory client (plus the directory service when
//! the node is a relay). Observers follow along through [`NodeEvent`]s or
//! poll [`ConnectivitySnapshot`]s.

mod chat;
mod config;
mod connectivity;
mod error;
mod events;
mod node;

pub use chat::ChatSession;
pub use config::{
    DEFAULT_CHAT_OPEN_TIMEOUT, DEFAULT_DIRECTORY_REQUEST_TIMEOUT, DEFAULT_RELAY_CONNECT_TIMEOUT,
    NodeRole, Timeouts,
};
pub use connectivity::{
    Connectivity, ConnectivityHandle, ConnectivitySnapshot, ConnectivityState,
};
pub use error::{ChatError, ConnectivityError, NodeError};
pub use events::NodeEvent;
pub use node::{DirectoryLookup, Node, NodeBuilder};
