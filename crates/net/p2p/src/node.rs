//! The swarm task.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::StreamExt;
use libp2p::{
    Multiaddr, PeerId, Swarm, SwarmBuilder, Transport,
    core::{ConnectedPoint, muxing::StreamMuxerBox},
    identify, noise, ping, relay,
    swarm::{
        ConnectionId as SwarmConnectionId, SwarmEvent,
        dial_opts::{DialOpts, PeerCondition},
    },
    tcp, yamux,
};
use libp2p_webrtc as webrtc;
use parking_lot::RwLock;
use parley_net_substrate::{SubstrateError, SubstrateEvent};
use parley_primitives::{Connection, ConnectionId, PeerAddress};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::{
    P2pConfig, P2pError, P2pHandle,
    behaviour::{ParleyBehaviour, ParleyBehaviourEvent},
    handle::{Command, Shared},
    identity::load_or_generate_keypair,
};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

type DialReply = oneshot::Sender<Result<Connection, SubstrateError>>;

/// Owns the libp2p swarm. Run with [`P2pNode::run`].
pub struct P2pNode {
    swarm: Swarm<ParleyBehaviour>,
    config: P2pConfig,
    command_rx: mpsc::Receiver<Command>,
    shared: Arc<Shared>,
    /// Swarm connection id to our id, for open connections.
    connection_ids: HashMap<SwarmConnectionId, ConnectionId>,
    next_connection: u64,
    pending_dials: HashMap<SwarmConnectionId, (PeerAddress, DialReply)>,
    /// Relays we have asked for a reservation.
    reservations: HashSet<PeerId>,
    /// Listen plus confirmed external addresses, in discovery order.
    addresses: Vec<Multiaddr>,
}

impl P2pNode {
    /// Build the swarm and its handle. Nothing runs until [`run`](Self::run).
    pub fn new(config: P2pConfig) -> Result<(Self, P2pHandle), P2pError> {
        info!("Initializing P2P network...");

        let keypair = load_or_generate_keypair(config.identity_file.as_deref())?;
        let relay_server = config.relay_server;
        let idle_timeout = config.idle_timeout;

        let swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| P2pError::Transport(e.to_string()))?
            .with_other_transport(|id_keys| {
                Ok(webrtc::tokio::Transport::new(
                    id_keys.clone(),
                    webrtc::tokio::Certificate::generate(&mut rand_08::thread_rng())?,
                )
                .map(|(peer_id, conn), _| (peer_id, StreamMuxerBox::new(conn))))
            })
            .map_err(|e| P2pError::Transport(e.to_string()))?
            .with_dns()
            .map_err(|e| P2pError::Transport(e.to_string()))?
            .with_relay_client(noise::Config::new, yamux::Config::default)
            .map_err(|e| P2pError::Transport(e.to_string()))?
            .with_behaviour(|keypair, relay_client| {
                ParleyBehaviour::new(keypair, relay_client, relay_server)
            })
            .map_err(|e| P2pError::Behaviour(e.to_string()))?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        let local_peer_id = *swarm.local_peer_id();
        info!(%local_peer_id, relay_server, "Local peer ID");

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            local_peer_id,
            connections: RwLock::new(Vec::new()),
            addresses: RwLock::new(Vec::new()),
            events,
        });
        let handle = P2pHandle::new(
            command_tx,
            swarm.behaviour().stream.new_control(),
            shared.clone(),
        );

        let node = Self {
            swarm,
            config,
            command_rx,
            shared,
            connection_ids: HashMap::new(),
            next_connection: 0,
            pending_dials: HashMap::new(),
            reservations: HashSet::new(),
            addresses: Vec::new(),
        };
        Ok((node, handle))
    }

    fn start_listening(&mut self) {
        for addr in self.config.listen_addrs.clone() {
            match self.swarm.listen_on(addr.clone()) {
                Ok(_) => info!(%addr, "Listening on address"),
                Err(e) => warn!(%addr, %e, "Failed to listen on address"),
            }
        }
        for addr in self.config.external_addrs.clone() {
            info!(%addr, "Advertising external address");
            self.swarm.add_external_address(addr);
        }
    }

    /// Run the network event loop until shutdown or every handle is dropped.
    pub async fn run(mut self) {
        self.start_listening();
        info!("Starting network event loop");

        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event);
                }

                command = self.command_rx.recv() => match command {
                    Some(Command::Dial { addr, reply }) => self.handle_dial(addr, reply),
                    Some(Command::Shutdown) | None => break,
                },
            }
        }

        for (_, (addr, reply)) in self.pending_dials.drain() {
            let _ = reply.send(Err(SubstrateError::Dial {
                addr,
                reason: "node shutting down".to_string(),
            }));
        }
        info!("Network event loop stopped");
    }

    fn handle_dial(&mut self, addr: PeerAddress, reply: DialReply) {
        let multiaddr = addr.as_multiaddr().clone();
        // Always open a fresh connection: an upgrade to a direct path must not
        // be suppressed by an existing relayed one.
        let opts = match addr.peer_id() {
            Some(peer_id) => DialOpts::peer_id(peer_id)
                .addresses(vec![multiaddr])
                .condition(PeerCondition::Always)
                .build(),
            None => DialOpts::unknown_peer_id().address(multiaddr).build(),
        };
        let id = opts.connection_id();

        debug!(%addr, "Dialing");
        match self.swarm.dial(opts) {
            Ok(()) => {
                self.pending_dials.insert(id, (addr, reply));
            }
            Err(e) => {
                warn!(%addr, %e, "Failed to dial");
                let _ = reply.send(Err(SubstrateError::Dial {
                    addr,
                    reason: e.to_string(),
                }));
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<ParleyBehaviourEvent>) {
        match event {
            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                endpoint,
                ..
            } => self.on_connection_established(peer_id, connection_id, &endpoint),
            SwarmEvent::ConnectionClosed {
                peer_id,
                connection_id,
                cause,
                ..
            } => {
                debug!(%peer_id, ?cause, "Connection closed");
                self.on_connection_closed(connection_id);
            }
            SwarmEvent::OutgoingConnectionError {
                connection_id,
                peer_id,
                error,
            } => {
                warn!(?peer_id, %error, "Outgoing connection error");
                if let Some((addr, reply)) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Err(SubstrateError::Dial {
                        addr,
                        reason: error.to_string(),
                    }));
                }
            }
            SwarmEvent::IncomingConnection {
                local_addr,
                send_back_addr,
                ..
            } => {
                trace!(%local_addr, %send_back_addr, "Incoming connection");
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "New listen address");
                self.add_address(address);
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                info!(%address, "Expired listen address");
                self.remove_address(&address);
            }
            SwarmEvent::ExternalAddrConfirmed { address } => {
                info!(%address, "External address confirmed");
                self.add_address(address);
            }
            SwarmEvent::ExternalAddrExpired { address } => {
                debug!(%address, "External address expired");
                self.remove_address(&address);
            }
            SwarmEvent::ListenerClosed {
                addresses, reason, ..
            } => {
                debug!(?reason, "Listener closed");
                for address in addresses {
                    self.remove_address(&address);
                }
            }
            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),
            _ => {}
        }
    }

    fn on_connection_established(
        &mut self,
        peer_id: PeerId,
        connection_id: SwarmConnectionId,
        endpoint: &ConnectedPoint,
    ) {
        let id = ConnectionId::new(self.next_connection);
        self.next_connection += 1;
        self.connection_ids.insert(connection_id, id);

        let conn = Connection::new(
            id,
            peer_id,
            PeerAddress::new(endpoint.get_remote_address().clone()),
        );
        info!(%conn, dialer = endpoint.is_dialer(), "Connection established");

        self.shared.connections.write().push(conn.clone());
        self.shared
            .emit(SubstrateEvent::ConnectionOpened(conn.clone()));

        if let Some((_, reply)) = self.pending_dials.remove(&connection_id) {
            let _ = reply.send(Ok(conn));
        }
    }

    fn on_connection_closed(&mut self, connection_id: SwarmConnectionId) {
        let Some(id) = self.connection_ids.remove(&connection_id) else {
            return;
        };
        let closed = {
            let mut connections = self.shared.connections.write();
            let pos = connections.iter().position(|c| c.id == id);
            pos.map(|pos| connections.remove(pos))
        };
        if let Some(conn) = closed {
            if !self
                .shared
                .connections
                .read()
                .iter()
                .any(|c| c.peer_id == conn.peer_id)
            {
                self.reservations.remove(&conn.peer_id);
            }
            self.shared.emit(SubstrateEvent::ConnectionClosed(conn));
        }
    }

    fn add_address(&mut self, address: Multiaddr) {
        if self.addresses.contains(&address) {
            return;
        }
        self.addresses.push(address);
        self.publish_addresses();
    }

    fn remove_address(&mut self, address: &Multiaddr) {
        let before = self.addresses.len();
        self.addresses.retain(|a| a != address);
        if self.addresses.len() != before {
            self.publish_addresses();
        }
    }

    fn publish_addresses(&self) {
        let local = self.shared.local_peer_id;
        let addrs: Vec<PeerAddress> = self
            .addresses
            .iter()
            .map(|a| PeerAddress::new(a.clone()).with_peer_id(local))
            .collect();
        debug!(count = addrs.len(), "Own addresses updated");
        *self.shared.addresses.write() = addrs.clone();
        self.shared.emit(SubstrateEvent::AddressesUpdated(addrs));
    }

    fn handle_behaviour_event(&mut self, event: ParleyBehaviourEvent) {
        match event {
            ParleyBehaviourEvent::Identify(event) => self.handle_identify_event(event),
            ParleyBehaviourEvent::RelayClient(event) => match event {
                relay::client::Event::ReservationReqAccepted {
                    relay_peer_id,
                    renewal,
                    ..
                } => {
                    info!(%relay_peer_id, renewal, "Relay reservation accepted");
                }
                other => debug!(?other, "Relay client event"),
            },
            ParleyBehaviourEvent::Relay(event) => {
                debug!(?event, "Relay server event");
            }
            ParleyBehaviourEvent::Ping(ping::Event { peer, result, .. }) => match result {
                Ok(rtt) => trace!(%peer, ?rtt, "Ping"),
                Err(e) => debug!(%peer, %e, "Ping failed"),
            },
            ParleyBehaviourEvent::Stream(()) => {}
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                debug!(
                    %peer_id,
                    protocol_version = %info.protocol_version,
                    agent_version = %info.agent_version,
                    "Received identify info"
                );

                if self.config.relay_server {
                    // A relay must know its public address to hand out reservations.
                    self.swarm.add_external_address(info.observed_addr.clone());
                }

                let is_relay = info.protocols.iter().any(|p| *p == relay::HOP_PROTOCOL_NAME);
                if is_relay && !self.reservations.contains(&peer_id) {
                    self.request_reservation(peer_id);
                }
            }
            identify::Event::Error { peer_id, error, .. } => {
                warn!(%peer_id, %error, "Identify error");
            }
            _ => {}
        }
    }

    /// Listen on `<relay>/p2p-circuit` so the relay accepts connections on our behalf.
    fn request_reservation(&mut self, relay: PeerId) {
        let Some(relay_addr) = self
            .shared
            .connections
            .read()
            .iter()
            .find(|c| c.peer_id == relay && !c.remote_addr.is_relayed())
            .map(|c| c.remote_addr.clone())
        else {
            return;
        };

        let circuit = relay_addr.with_peer_id(relay).circuit();
        match self.swarm.listen_on(circuit.clone().into_multiaddr()) {
            Ok(_) => {
                info!(%relay, addr = %circuit, "Requesting relay reservation");
                self.reservations.insert(relay);
            }
            Err(e) => warn!(%relay, %e, "Failed to listen on relay circuit"),
        }
    }
}
