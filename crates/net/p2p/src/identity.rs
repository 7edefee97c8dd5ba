//! Node identity persistence.
//!
//! The key file holds the libp2p protobuf encoding of an ed25519 keypair.

use std::{fs, io, path::Path};

use libp2p::identity::{DecodingError, Keypair};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid key file: {0}")]
    Decode(#[from] DecodingError),
}

/// Load the keypair at `path`, creating it if missing. Ephemeral when `None`.
pub fn load_or_generate_keypair(path: Option<&Path>) -> Result<Keypair, IdentityError> {
    let Some(path) = path else {
        return Ok(Keypair::generate_ed25519());
    };

    if path.exists() {
        let bytes = fs::read(path)?;
        let keypair = Keypair::from_protobuf_encoding(&bytes)?;
        info!(path = %path.display(), peer_id = %keypair.public().to_peer_id(), "Loaded identity");
        return Ok(keypair);
    }

    let keypair = Keypair::generate_ed25519();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Write to temp file first, then rename (atomic)
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, keypair.to_protobuf_encoding()?)?;
    fs::rename(&tmp_path, path)?;

    info!(path = %path.display(), peer_id = %keypair.public().to_peer_id(), "Generated new identity");
    Ok(keypair)
}
