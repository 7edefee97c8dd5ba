//! libp2p substrate for parley.
//!
//! A [`P2pNode`] owns the libp2p swarm and runs it in its own task. The
//! cloneable [`P2pHandle`] talks to that task over a command channel and
//! implements [`Substrate`](parley_net_substrate::Substrate).
//!
//! The stack is TCP (noise + yamux), WebRTC-direct, DNS and the circuit relay
//! v2 client. A relay additionally runs the relay server behaviour.

mod behaviour;
mod config;
mod error;
mod handle;
mod identity;
mod node;

pub use config::{DEFAULT_IDLE_TIMEOUT, P2pConfig};
pub use error::P2pError;
pub use handle::P2pHandle;
pub use identity::{IdentityError, load_or_generate_keypair};
pub use node::P2pNode;
