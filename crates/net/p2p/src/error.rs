use crate::IdentityError;

/// Errors building the swarm.
#[derive(Debug, thiserror::Error)]
pub enum P2pError {
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Behaviour error: {0}")]
    Behaviour(String),
}
