//! Connectivity service actor (runs in its own tokio task).

use std::sync::Arc;

use parley_net_substrate::{Multiplexer, Substrate, SubstrateEvent};
use parley_primitives::Connection;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::{Connectivity, ConnectivityHandle, ConnectivitySnapshot};
use crate::{ConnectivityError, NodeEvent};

/// Commands from the handle to the service.
pub(crate) enum ConnectivityCommand {
    BeginBootstrap {
        response_tx: oneshot::Sender<Result<(), ConnectivityError>>,
    },
    BootstrapFinished {
        /// The relay connection, or `None` if the dial failed.
        outcome: Option<Connection>,
        /// Whether the relay connection was adopted.
        response_tx: oneshot::Sender<bool>,
    },
    /// A dial we initiated returned this connection.
    Observe {
        connection: Connection,
        response_tx: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Sole owner of the [`Connectivity`] machine.
pub(crate) struct ConnectivityService<S> {
    command_rx: mpsc::UnboundedReceiver<ConnectivityCommand>,
    substrate_events: broadcast::Receiver<SubstrateEvent>,
    mux: Arc<Multiplexer<S>>,
    machine: Connectivity,
    snapshot_tx: watch::Sender<ConnectivitySnapshot>,
    events: broadcast::Sender<NodeEvent>,
}

impl<S: Substrate> ConnectivityService<S> {
    /// Seed from the substrate's current state and spawn the service.
    pub(crate) fn spawn(
        mux: Arc<Multiplexer<S>>,
        events: broadcast::Sender<NodeEvent>,
    ) -> ConnectivityHandle {
        // Subscribe before reading the current state so nothing falls between.
        let substrate_events = mux.substrate().subscribe();
        let mut machine = Connectivity::new();
        machine.resync(
            mux.substrate().connections(),
            mux.substrate().listen_addresses(),
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot().clone());

        let service = Self {
            command_rx,
            substrate_events,
            mux,
            machine,
            snapshot_tx,
            events,
        };
        tokio::spawn(service.run());

        ConnectivityHandle::new(command_tx, snapshot_rx)
    }

    /// Run the service event loop.
    ///
    /// Runs until every handle is dropped, a shutdown command arrives, or the
    /// substrate stops publishing events.
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(ConnectivityCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                event = self.substrate_events.recv() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Missed substrate events, resyncing");
                        let connections = self.mux.substrate().connections();
                        let addresses = self.mux.substrate().listen_addresses();
                        let events = self.machine.resync(connections, addresses);
                        self.publish(events);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("Connectivity service shutting down");
    }

    fn handle_command(&mut self, cmd: ConnectivityCommand) {
        match cmd {
            ConnectivityCommand::BeginBootstrap { response_tx } => {
                let result = self.machine.begin_bootstrap().map(|events| self.publish(events));
                let _ = response_tx.send(result);
            }
            ConnectivityCommand::BootstrapFinished {
                outcome,
                response_tx,
            } => {
                // The dial may have returned a connection that closed since.
                let conn = outcome.filter(|conn| {
                    let open = self.is_open(conn);
                    if !open {
                        warn!(relay = %conn.peer_id, "Relay connection closed during bootstrap");
                    }
                    open
                });
                let adopted = conn.is_some();
                let events = match conn {
                    Some(conn) => {
                        info!(relay = %conn.peer_id, addr = %conn.remote_addr, "Relay connected");
                        self.machine.bootstrap_succeeded(conn)
                    }
                    None => self.machine.bootstrap_failed(),
                };
                self.publish(events);
                let _ = response_tx.send(adopted);
            }
            ConnectivityCommand::Observe {
                connection,
                response_tx,
            } => {
                // It may have closed before we got here.
                if self.is_open(&connection) {
                    let events = self.machine.connection_opened(connection);
                    self.publish(events);
                }
                let _ = response_tx.send(());
            }
            ConnectivityCommand::Shutdown => {}
        }
    }

    fn is_open(&self, connection: &Connection) -> bool {
        self.mux
            .substrate()
            .connections()
            .iter()
            .any(|c| c.id == connection.id)
    }

    fn handle_event(&mut self, event: SubstrateEvent) {
        let events = match event {
            SubstrateEvent::ConnectionOpened(conn) => {
                debug!(%conn, "Connection opened");
                self.machine.connection_opened(conn)
            }
            SubstrateEvent::ConnectionClosed(conn) => {
                debug!(%conn, "Connection closed");
                self.machine.connection_closed(&conn)
            }
            SubstrateEvent::AddressesUpdated(addresses) => {
                debug!(count = addresses.len(), "Own addresses updated");
                self.machine.addresses_updated(addresses)
            }
        };
        self.publish(events);
    }

    /// Publish the snapshot first, so an observer reacting to an event reads
    /// the state that caused it.
    fn publish(&self, events: Vec<NodeEvent>) {
        let snapshot = self.machine.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if current == snapshot {
                return false;
            }
            *current = snapshot.clone();
            true
        });

        for event in events {
            match &event {
                NodeEvent::StateChanged(state) => info!(%state, "Connectivity state changed"),
                NodeEvent::RelayLost => warn!("Lost relay connection"),
                NodeEvent::DirectPathChanged {
                    available,
                    best_peer,
                } => info!(available, ?best_peer, "Direct path changed"),
                NodeEvent::AddressesChanged(addrs) => {
                    for addr in addrs {
                        info!(%addr, "Direct-capable address");
                    }
                }
                _ => {}
            }
            let _ = self.events.send(event);
        }
    }
}
