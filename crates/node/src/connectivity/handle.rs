//! Cloneable handle for the connectivity service.

use parley_directory::RelayLocator;
use parley_primitives::Connection;
use tokio::sync::{mpsc, oneshot, watch};

use super::{ConnectivitySnapshot, service::ConnectivityCommand};
use crate::ConnectivityError;

/// Cloneable handle: commands go to the service, reads come from the snapshot.
#[derive(Clone)]
pub struct ConnectivityHandle {
    command_tx: mpsc::UnboundedSender<ConnectivityCommand>,
    snapshot_rx: watch::Receiver<ConnectivitySnapshot>,
}

impl ConnectivityHandle {
    pub(crate) fn new(
        command_tx: mpsc::UnboundedSender<ConnectivityCommand>,
        snapshot_rx: watch::Receiver<ConnectivitySnapshot>,
    ) -> Self {
        Self {
            command_tx,
            snapshot_rx,
        }
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> ConnectivitySnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that is notified on every snapshot change.
    pub fn watch(&self) -> watch::Receiver<ConnectivitySnapshot> {
        self.snapshot_rx.clone()
    }

    pub(crate) async fn begin_bootstrap(&self) -> Result<(), ConnectivityError> {
        let (response_tx, rx) = oneshot::channel();
        self.send(ConnectivityCommand::BeginBootstrap { response_tx })?;
        rx.await.map_err(|_| ConnectivityError::Stopped)?
    }

    /// Report the bootstrap dial. Returns whether the relay was adopted.
    pub(crate) async fn finish_bootstrap(
        &self,
        outcome: Option<Connection>,
    ) -> Result<bool, ConnectivityError> {
        let (response_tx, rx) = oneshot::channel();
        self.send(ConnectivityCommand::BootstrapFinished {
            outcome,
            response_tx,
        })?;
        rx.await.map_err(|_| ConnectivityError::Stopped)
    }

    /// Record a connection our own dial produced, without waiting for the event.
    pub(crate) async fn observe(&self, connection: Connection) -> Result<(), ConnectivityError> {
        let (response_tx, rx) = oneshot::channel();
        self.send(ConnectivityCommand::Observe {
            connection,
            response_tx,
        })?;
        rx.await.map_err(|_| ConnectivityError::Stopped)
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectivityCommand::Shutdown);
    }

    fn send(&self, cmd: ConnectivityCommand) -> Result<(), ConnectivityError> {
        self.command_tx
            .send(cmd)
            .map_err(|_| ConnectivityError::Stopped)
    }
}

impl RelayLocator for ConnectivityHandle {
    fn relay_connection(&self) -> Option<Connection> {
        self.snapshot_rx.borrow().relay_connection().cloned()
    }
}
