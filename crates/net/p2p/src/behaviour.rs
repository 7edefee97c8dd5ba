use libp2p::{
    PeerId, identify, identity::Keypair, ping, relay, swarm::NetworkBehaviour,
    swarm::behaviour::toggle::Toggle,
};

/// Identify protocol version advertised by parley nodes.
const IDENTIFY_PROTOCOL: &str = "/parley/1.0.0";

/// Network behaviour shared by peers and relays.
#[derive(NetworkBehaviour)]
pub(crate) struct ParleyBehaviour {
    /// Circuit relay v2 client: reservations and relayed dials.
    pub(crate) relay_client: relay::client::Behaviour,

    /// Circuit relay v2 server, enabled on relays only.
    pub(crate) relay: Toggle<relay::Behaviour>,

    /// Identify protocol - exchange listen addresses and supported protocols.
    pub(crate) identify: identify::Behaviour,

    pub(crate) ping: ping::Behaviour,

    /// Named protocol streams.
    pub(crate) stream: libp2p_stream::Behaviour,
}

impl ParleyBehaviour {
    pub(crate) fn new(
        keypair: &Keypair,
        relay_client: relay::client::Behaviour,
        relay_server: bool,
    ) -> Self {
        let local_peer_id = PeerId::from(keypair.public());
        let relay = relay_server.then(|| relay::Behaviour::new(local_peer_id, Default::default()));

        Self {
            relay_client,
            relay: Toggle::from(relay),
            identify: identify::Behaviour::new(
                identify::Config::new(IDENTIFY_PROTOCOL.to_string(), keypair.public())
                    .with_agent_version(format!("parley/{}", env!("CARGO_PKG_VERSION"))),
            ),
            ping: ping::Behaviour::default(),
            stream: libp2p_stream::Behaviour::new(),
        }
    }
}
