use std::sync::Arc;

use parley_directory::{
    DirectoryClient, DirectoryError, DirectoryService, DirectoryStore, DirectoryValue,
    MemoryDirectoryStore,
};
use parley_net_substrate::{Multiplexer, Substrate};
use parley_primitives::{
    CHAT_PROTOCOL, Connection, DIRECTORY_QUERY_PROTOCOL, DIRECTORY_STORE_PROTOCOL, PeerAddress,
    PeerId, validate_directory_key,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    ChatError, ChatSession, ConnectivityError, ConnectivityHandle, ConnectivitySnapshot,
    NodeError, NodeEvent, NodeRole, Timeouts,
    connectivity::ConnectivityService,
    events::EVENT_CAPACITY,
};

type SharedStore = Arc<dyn DirectoryStore>;

/// Builds a [`Node`] on top of a substrate.
///
/// # Example
///
/// ```ignore
/// let node = NodeBuilder::new(substrate)
///     .bootstrap_relay(relay_addr)
///     .build()?;
/// node.bootstrap().await?;
/// ```
pub struct NodeBuilder<S> {
    substrate: S,
    role: NodeRole,
    timeouts: Timeouts,
    bootstrap_relay: Option<PeerAddress>,
    store: Option<SharedStore>,
}

impl<S: Substrate> NodeBuilder<S> {
    pub fn new(substrate: S) -> Self {
        Self {
            substrate,
            role: NodeRole::default(),
            timeouts: Timeouts::default(),
            bootstrap_relay: None,
            store: None,
        }
    }

    pub fn role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The relay [`Node::bootstrap`] dials.
    pub fn bootstrap_relay(mut self, addr: PeerAddress) -> Self {
        self.bootstrap_relay = Some(addr);
        self
    }

    /// Backing store for the directory a relay serves. In memory by default.
    pub fn directory_store(mut self, store: impl DirectoryStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Wire everything up and register the role's protocol handlers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Node<S>, NodeError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mux = Arc::new(Multiplexer::new(self.substrate));
        let connectivity = ConnectivityService::spawn(mux.clone(), events.clone());
        let chat = Arc::new(ChatSession::new(
            mux.clone(),
            events.clone(),
            self.timeouts.chat_open,
        ));
        let directory = DirectoryClient::new(
            mux.clone(),
            connectivity.clone(),
            self.timeouts.directory_request,
        );

        let mut directory_service = None;
        match self.role {
            NodeRole::Peer => {
                let chat = chat.clone();
                mux.register_handler(CHAT_PROTOCOL, move |inbound| {
                    let chat = chat.clone();
                    async move { chat.accept(inbound).await }
                })?;
            }
            NodeRole::Relay => {
                let store = self
                    .store
                    .unwrap_or_else(|| Arc::new(MemoryDirectoryStore::new()));
                let service = Arc::new(
                    DirectoryService::new(store)
                        .with_request_timeout(self.timeouts.directory_request),
                );

                let store_service = service.clone();
                mux.register_handler(DIRECTORY_STORE_PROTOCOL, move |inbound| {
                    let service = store_service.clone();
                    async move { service.serve_store(inbound).await }
                })?;
                let query_service = service.clone();
                mux.register_handler(DIRECTORY_QUERY_PROTOCOL, move |inbound| {
                    let service = query_service.clone();
                    async move { service.serve_query(inbound).await }
                })?;
                directory_service = Some(service);
            }
        }

        info!(
            role = %self.role,
            peer_id = %mux.substrate().local_peer_id(),
            "Node ready"
        );

        Ok(Node {
            role: self.role,
            timeouts: self.timeouts,
            bootstrap_relay: self.bootstrap_relay,
            mux,
            connectivity,
            chat,
            directory,
            directory_service,
            events,
        })
    }
}

/// Result of [`Node::connect_via_directory`] for a key that was found.
#[derive(Debug)]
pub struct DirectoryLookup {
    /// What the directory returned.
    pub value: DirectoryValue,
    /// Outcome of dialing it, independent of the lookup.
    pub connection: Result<Connection, ConnectivityError>,
}

/// One running parley node.
///
/// Owns the multiplexer, the connectivity service, the chat session and the
/// directory client. Any number of nodes can share a process.
pub struct Node<S> {
    role: NodeRole,
    timeouts: Timeouts,
    bootstrap_relay: Option<PeerAddress>,
    mux: Arc<Multiplexer<S>>,
    connectivity: ConnectivityHandle,
    chat: Arc<ChatSession<S>>,
    directory: DirectoryClient<S, ConnectivityHandle>,
    directory_service: Option<Arc<DirectoryService<SharedStore>>>,
    events: broadcast::Sender<NodeEvent>,
}

impl<S: Substrate> Node<S> {
    pub fn peer_id(&self) -> PeerId {
        self.mux.substrate().local_peer_id()
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn substrate(&self) -> &S {
        self.mux.substrate()
    }

    pub fn chat(&self) -> &ChatSession<S> {
        &self.chat
    }

    /// The directory this node serves, if it is a relay.
    pub fn directory_service(&self) -> Option<&DirectoryService<Arc<dyn DirectoryStore>>> {
        self.directory_service.as_deref()
    }

    pub fn connectivity(&self) -> &ConnectivityHandle {
        &self.connectivity
    }

    pub fn snapshot(&self) -> ConnectivitySnapshot {
        self.connectivity.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Dial the configured relay once, bounded by the relay-connect timeout.
    ///
    /// On failure the node is left `Isolated`. There is no retry; call again.
    pub async fn bootstrap(&self) -> Result<Connection, ConnectivityError> {
        let relay = self
            .bootstrap_relay
            .clone()
            .ok_or(ConnectivityError::NoBootstrapRelay)?;
        self.connectivity.begin_bootstrap().await?;

        info!(%relay, "Dialing bootstrap relay");
        let mut result = self.dial_bounded(relay.clone()).await;
        let adopted = self
            .connectivity
            .finish_bootstrap(result.as_ref().ok().cloned())
            .await?;
        if result.is_ok() && !adopted {
            result = Err(ConnectivityError::DialFailed(
                "relay connection closed during bootstrap".to_string(),
            ));
        }
        if let Err(e) = &result {
            warn!(%relay, %e, "Relay bootstrap failed");
        }
        result
    }

    /// Dial `addr`, bounded by the relay-connect timeout.
    pub async fn dial(&self, addr: PeerAddress) -> Result<Connection, ConnectivityError> {
        if addr.is_relayed() {
            info!(%addr, "Dialing relayed address, connection might be slower");
        }
        let conn = self.dial_bounded(addr.clone()).await.inspect_err(|e| {
            warn!(%addr, %e, "Dial failed");
        })?;
        self.connectivity.observe(conn.clone()).await?;
        info!(%conn, "Connected");
        Ok(conn)
    }

    async fn dial_bounded(&self, addr: PeerAddress) -> Result<Connection, ConnectivityError> {
        let timeout = self.timeouts.relay_connect;
        match tokio::time::timeout(timeout, self.mux.substrate().dial(addr)).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(ConnectivityError::DialFailed(e.to_string())),
            Err(_) => Err(ConnectivityError::DialTimeout(timeout)),
        }
    }

    /// Send a chat message to the best direct peer.
    pub async fn send_chat(&self, text: &str) -> Result<(), ChatError> {
        let target = self.connectivity.snapshot().best_peer;
        self.chat.send(target.as_ref(), text).await
    }

    /// Map `key` to `value` on the relay.
    pub async fn store(&self, key: &str, value: &DirectoryValue) -> Result<(), DirectoryError> {
        self.directory.store(key, value).await
    }

    /// Look `key` up on the relay.
    pub async fn query(&self, key: &str) -> Result<Option<DirectoryValue>, DirectoryError> {
        self.directory.query(key).await
    }

    /// Publish our own address under `key`.
    ///
    /// Prefers the first direct-capable address. Falls back to a WebRTC
    /// address routed through a relay circuit.
    pub async fn publish_address(&self, key: &str) -> Result<DirectoryValue, NodeError> {
        validate_directory_key(key).map_err(DirectoryError::from)?;

        let snapshot = self.connectivity.snapshot();
        let addr = match snapshot.direct_addresses.first() {
            Some(addr) => addr.clone(),
            None => {
                let fallback = snapshot
                    .addresses
                    .iter()
                    .find(|a| a.is_relayed() && a.has_webrtc())
                    .cloned()
                    .ok_or(NodeError::NoDirectAddress)?;
                warn!(addr = %fallback, "No direct address, publishing relayed WebRTC address");
                fallback
            }
        };

        let value = DirectoryValue::from(addr);
        self.directory.store(key, &value).await?;
        info!(%key, %value, "Published address");
        Ok(value)
    }

    /// Look `key` up and dial the result.
    ///
    /// `Ok(None)` means the key is not in the directory. A found key always
    /// yields a [`DirectoryLookup`], whether or not the dial worked.
    pub async fn connect_via_directory(
        &self,
        key: &str,
    ) -> Result<Option<DirectoryLookup>, NodeError> {
        let Some(value) = self.directory.query(key).await? else {
            info!(%key, "Address not found in directory");
            return Ok(None);
        };

        info!(%key, %value, "Found address in directory");
        let connection = match value.to_address() {
            Ok(addr) => self.dial(addr).await,
            Err(e) => Err(ConnectivityError::InvalidAddress(e)),
        };
        Ok(Some(DirectoryLookup { value, connection }))
    }

    /// Close the chat stream and stop every background task.
    pub async fn shutdown(&self) {
        self.chat.close().await;
        self.mux.shutdown();
        self.connectivity.shutdown();
        info!("Node stopped");
    }
}
