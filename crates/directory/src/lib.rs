//! The SS58 address directory.
//!
//! A relay hosts the authoritative mapping from SS58 address to peer address
//! and serves it over two stream protocols, one request/response pair per
//! stream:
//!
//! | Protocol | Request | Response |
//! |---|---|---|
//! | store | `{"key", "value"}` | `{"success", "error"?}` |
//! | query | `{"action": "get", "key"}` | `{"success", "found"?, "value"?, "error"?}` |
//!
//! [`DirectoryService`] is the relay side. [`DirectoryClient`] is the peer side.

mod client;
mod error;
mod messages;
mod service;
pub mod store;
mod value;

pub use client::{DirectoryClient, RelayLocator};
pub use error::{DirectoryError, QueryError, StoreError};
pub use messages::{
    ACTION_GET, ERR_INVALID_KEY, ERR_MALFORMED_REQUEST, ERR_STORAGE, ERR_UNSUPPORTED_ACTION,
    QueryRequest, QueryResponse, StoreRequest, StoreResponse,
};
pub use service::{DEFAULT_REQUEST_TIMEOUT, DirectoryService};
pub use store::{DirectoryStore, DirectoryStoreError, FileDirectoryStore, MemoryDirectoryStore};
pub use value::DirectoryValue;
