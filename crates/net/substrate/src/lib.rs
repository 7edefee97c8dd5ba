//! The networking substrate boundary.
//!
//! Everything below this crate (transports, encryption, multiplexing, NAT
//! traversal) is a black box reached through the [`Substrate`] trait. The
//! [`Multiplexer`] sits on top and routes named protocols to handlers.
//!
//! With the `test-utils` feature, [`memory::MemoryNetwork`] provides an
//! in-process substrate for deterministic tests.

mod error;
mod multiplexer;
mod stream;
mod substrate;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use error::{OpenError, SubstrateError};
pub use multiplexer::Multiplexer;
pub use stream::{BoxedStream, InboundStream, IncomingStreams, StreamIo};
pub use substrate::{Substrate, SubstrateEvent};
