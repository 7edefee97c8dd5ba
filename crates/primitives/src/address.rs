//! Peer addresses and transport classification.
//!
//! A [`PeerAddress`] is a self-describing multiaddr. Its string form is the
//! canonical text encoding and round-trips exactly, which is what the
//! directory stores and what users paste into `/dial`.
//!
//! Classification only looks at protocol components:
//!
//! | contains `p2p-circuit` | contains `webrtc`/`webrtc-direct` | kind |
//! |---|---|---|
//! | yes | any | [`TransportKind::Relayed`] |
//! | no | yes | [`TransportKind::DirectCapable`] |
//! | no | no | [`TransportKind::RendezvousOnly`] |

use core::fmt;
use core::str::FromStr;

use libp2p::{Multiaddr, PeerId, multiaddr::Protocol};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error parsing a [`PeerAddress`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The text is not a valid multiaddr.
    #[error("invalid multiaddr {input:?}: {reason}")]
    Parse {
        /// The rejected input.
        input: String,
        /// Parser message.
        reason: String,
    },
    /// The multiaddr is empty.
    #[error("empty multiaddr")]
    Empty,
}

/// How a connection (or an address) reaches its peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Traffic flows through a relay circuit.
    Relayed,
    /// A direct browser-grade transport (WebRTC) with no relay hop.
    DirectCapable,
    /// A plain connection, typically the one to the relay itself.
    RendezvousOnly,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Relayed => "relayed",
            Self::DirectCapable => "direct",
            Self::RendezvousOnly => "rendezvous",
        })
    }
}

/// A multiaddr identifying how to reach a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress(Multiaddr);

impl PeerAddress {
    /// Wrap a multiaddr.
    pub const fn new(addr: Multiaddr) -> Self {
        Self(addr)
    }

    /// The underlying multiaddr.
    pub const fn as_multiaddr(&self) -> &Multiaddr {
        &self.0
    }

    /// Consume into the underlying multiaddr.
    pub fn into_multiaddr(self) -> Multiaddr {
        self.0
    }

    /// The terminal `/p2p/<id>` component, if present.
    ///
    /// For circuit addresses this is the far peer, not the relay.
    pub fn peer_id(&self) -> Option<PeerId> {
        match self.0.iter().last() {
            Some(Protocol::P2p(peer_id)) => Some(peer_id),
            _ => None,
        }
    }

    /// Append `/p2p/<peer_id>` unless the address already ends with a peer id.
    pub fn with_peer_id(self, peer_id: PeerId) -> Self {
        if self.peer_id().is_some() {
            return self;
        }
        Self(self.0.with(Protocol::P2p(peer_id)))
    }

    /// Extend a relay address into a circuit listen address.
    pub fn circuit(&self) -> Self {
        Self(self.0.clone().with(Protocol::P2pCircuit))
    }

    /// Transport classification of this address.
    pub fn kind(&self) -> TransportKind {
        classify(self)
    }

    /// Whether the address has a direct WebRTC leg with no relay hop.
    pub fn is_direct_capable(&self) -> bool {
        is_direct_capable(self)
    }

    /// Whether the address routes through a relay circuit.
    pub fn is_relayed(&self) -> bool {
        self.kind() == TransportKind::Relayed
    }

    /// Whether any component names a WebRTC transport, circuit or not.
    pub fn has_webrtc(&self) -> bool {
        self.0
            .iter()
            .any(|p| matches!(p, Protocol::WebRTC | Protocol::WebRTCDirect))
    }
}

/// Classify an address by its protocol components.
pub fn classify(addr: &PeerAddress) -> TransportKind {
    let mut circuit = false;
    let mut webrtc = false;
    for protocol in addr.0.iter() {
        match protocol {
            Protocol::P2pCircuit => circuit = true,
            Protocol::WebRTC | Protocol::WebRTCDirect => webrtc = true,
            _ => {}
        }
    }

    match (circuit, webrtc) {
        (true, _) => TransportKind::Relayed,
        (false, true) => TransportKind::DirectCapable,
        (false, false) => TransportKind::RendezvousOnly,
    }
}

/// True iff the address carries a WebRTC component and no circuit component.
pub fn is_direct_capable(addr: &PeerAddress) -> bool {
    classify(addr) == TransportKind::DirectCapable
}

impl From<Multiaddr> for PeerAddress {
    fn from(addr: Multiaddr) -> Self {
        Self(addr)
    }
}

impl From<PeerAddress> for Multiaddr {
    fn from(addr: PeerAddress) -> Self {
        addr.0
    }
}

impl AsRef<Multiaddr> for PeerAddress {
    fn as_ref(&self) -> &Multiaddr {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PeerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        let addr = Multiaddr::from_str(s).map_err(|e| AddressError::Parse {
            input: s.to_string(),
            reason: e.to_string(),
        })?;
        if addr.is_empty() {
            return Err(AddressError::Empty);
        }
        Ok(Self(addr))
    }
}

impl Serialize for PeerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PeerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use libp2p::identity::Keypair;
    use proptest::prelude::*;

    const RELAY: &str = "12D3KooWA1bysjrTACSWqf6q172inxvwKHUxAnBtVgaVDKMxpZtx";

    fn addr(s: &str) -> PeerAddress {
        s.parse().unwrap()
    }

    fn peer_from_seed(seed: u8) -> PeerId {
        Keypair::ed25519_from_bytes([seed; 32]).unwrap().public().to_peer_id()
    }

    #[test]
    fn test_classify_direct() {
        let a = addr("/ip4/10.0.0.5/udp/9090/webrtc-direct");
        assert_eq!(a.kind(), TransportKind::DirectCapable);
        assert!(a.is_direct_capable());
        assert!(!a.is_relayed());
    }

    #[test]
    fn test_classify_circuit_with_webrtc_is_relayed() {
        let a = addr(&format!(
            "/ip4/34.73.155.58/tcp/8080/ws/p2p/{RELAY}/p2p-circuit/webrtc"
        ));
        assert_eq!(a.kind(), TransportKind::Relayed);
        assert!(!a.is_direct_capable());
        assert!(a.has_webrtc());
    }

    #[test]
    fn test_classify_plain_relay_connection() {
        let a = addr(&format!("/ip4/34.73.155.58/tcp/8080/ws/p2p/{RELAY}"));
        assert_eq!(a.kind(), TransportKind::RendezvousOnly);
        assert!(!a.has_webrtc());
    }

    #[test]
    fn test_peer_id_is_terminal_component() {
        let far = peer_from_seed(7);
        let a = addr(&format!(
            "/ip4/1.2.3.4/tcp/1/p2p/{RELAY}/p2p-circuit/webrtc/p2p/{far}"
        ));
        assert_eq!(a.peer_id(), Some(far));

        let relay_only = addr(&format!("/ip4/1.2.3.4/tcp/1/p2p/{RELAY}/p2p-circuit"));
        assert_eq!(relay_only.peer_id(), None);
    }

    #[test]
    fn test_with_peer_id_does_not_duplicate() {
        let peer = peer_from_seed(1);
        let a = addr("/ip4/127.0.0.1/tcp/4001").with_peer_id(peer);
        assert_eq!(a.peer_id(), Some(peer));
        let again = a.clone().with_peer_id(peer_from_seed(2));
        assert_eq!(again, a);
    }

    #[test]
    fn test_circuit_extends_relay_address() {
        let relay = addr(&format!("/ip4/1.2.3.4/tcp/1/p2p/{RELAY}"));
        assert_eq!(
            relay.circuit().to_string(),
            format!("/ip4/1.2.3.4/tcp/1/p2p/{RELAY}/p2p-circuit")
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!("".parse::<PeerAddress>(), Err(AddressError::Empty));
        assert_matches!("   ".parse::<PeerAddress>(), Err(AddressError::Empty));
        assert_matches!(
            "not-a-multiaddr".parse::<PeerAddress>(),
            Err(AddressError::Parse { .. })
        );
    }

    #[test]
    fn test_serde_as_string() {
        let a = addr("/ip4/127.0.0.1/udp/1234/webrtc-direct");
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"/ip4/127.0.0.1/udp/1234/webrtc-direct\"");
        let back: PeerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    fn arb_address() -> impl Strategy<Value = (PeerAddress, bool, bool)> {
        (
            any::<[u8; 4]>(),
            1u16..,
            prop_oneof![Just("tcp"), Just("udp")],
            any::<bool>(),
            any::<bool>(),
            any::<u8>(),
        )
            .prop_map(|(ip, port, transport, circuit, webrtc, seed)| {
                let [a, b, c, d] = ip;
                let mut s = format!("/ip4/{a}.{b}.{c}.{d}/{transport}/{port}");
                if circuit {
                    s.push_str(&format!("/p2p/{}/p2p-circuit", peer_from_seed(seed)));
                }
                if webrtc {
                    s.push_str(if circuit { "/webrtc" } else { "/webrtc-direct" });
                }
                (s.parse().unwrap(), circuit, webrtc)
            })
    }

    proptest! {
        #[test]
        fn test_text_round_trip((a, _, _) in arb_address()) {
            let text = a.to_string();
            let back: PeerAddress = text.parse().unwrap();
            prop_assert_eq!(back.to_string(), text);
            prop_assert_eq!(back, a);
        }

        #[test]
        fn test_classification_table((a, circuit, webrtc) in arb_address()) {
            let expected = match (circuit, webrtc) {
                (true, _) => TransportKind::Relayed,
                (false, true) => TransportKind::DirectCapable,
                (false, false) => TransportKind::RendezvousOnly,
            };
            prop_assert_eq!(a.kind(), expected);
            prop_assert_eq!(a.is_direct_capable(), !circuit && webrtc);
        }
    }
}
