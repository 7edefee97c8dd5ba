//! Stream codecs for parley protocols.
//!
//! Messages go on the wire as raw bytes with no length prefix, so plain
//! libp2p example peers interoperate. Each message is one write.
//!
//! - [`TextCodec`] yields whatever UTF-8 text each read delivered
//! - [`JsonCodec`] buffers until one complete JSON value has arrived
//!
//! Both plug into [`asynchronous_codec::Framed`] and friends.

mod error;
mod json;
mod text;

pub use error::FrameError;
pub use json::JsonCodec;
pub use text::TextCodec;

pub use asynchronous_codec::{Framed, FramedRead, FramedWrite};

/// Upper bound on one message, in either direction.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
