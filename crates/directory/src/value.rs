use core::fmt;

use parley_primitives::{AddressError, PeerAddress};
use serde::{Deserialize, Serialize};

/// A directory value: the canonical text form of a peer address.
///
/// Kept as text so a value round-trips byte for byte, even if it was stored
/// by a client with a different multiaddr parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectoryValue(String);

impl DirectoryValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Parse the value as a peer address.
    pub fn to_address(&self) -> Result<PeerAddress, AddressError> {
        self.0.parse()
    }
}

impl From<&PeerAddress> for DirectoryValue {
    fn from(addr: &PeerAddress) -> Self {
        Self(addr.to_string())
    }
}

impl From<PeerAddress> for DirectoryValue {
    fn from(addr: PeerAddress) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for DirectoryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
