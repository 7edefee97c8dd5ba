//! Protocol multiplexer.
//!
//! One handler per protocol name. Each inbound stream gets its own task, so a
//! slow handler never blocks the accept loop for its protocol.

use std::{collections::HashMap, future::Future, time::Duration};

use futures::StreamExt;
use parking_lot::Mutex;
use parley_primitives::{PeerAddress, StreamProtocol};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::{BoxedStream, InboundStream, OpenError, Substrate, SubstrateError};

/// Routes inbound streams to handlers and opens outbound streams with a deadline.
pub struct Multiplexer<S> {
    substrate: S,
    handlers: Mutex<HashMap<StreamProtocol, JoinHandle<()>>>,
}

impl<S: Substrate> Multiplexer<S> {
    pub fn new(substrate: S) -> Self {
        Self {
            substrate,
            handlers: Default::default(),
        }
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    /// Register the handler for `protocol`.
    ///
    /// Registering the same protocol twice is a configuration error.
    pub fn register_handler<H, Fut>(
        &self,
        protocol: StreamProtocol,
        handler: H,
    ) -> Result<(), SubstrateError>
    where
        H: Fn(InboundStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut handlers = self.handlers.lock();
        if handlers.contains_key(&protocol) {
            return Err(SubstrateError::AlreadyRegistered(protocol));
        }

        let mut incoming = self.substrate.accept(protocol.clone())?;
        let name = protocol.clone();
        let task = tokio::spawn(async move {
            while let Some(inbound) = incoming.next().await {
                trace!(protocol = %name, peer_id = %inbound.peer_id, "Inbound stream");
                tokio::spawn(handler(inbound));
            }
            debug!(protocol = %name, "Accept loop ended");
        });

        handlers.insert(protocol.clone(), task);
        debug!(%protocol, "Registered protocol handler");
        Ok(())
    }

    /// Whether a handler is registered for `protocol`.
    pub fn is_registered(&self, protocol: &StreamProtocol) -> bool {
        self.handlers.lock().contains_key(protocol)
    }

    /// Open a stream for `protocol` to `addr`, giving up after `timeout`.
    pub async fn open_stream(
        &self,
        addr: &PeerAddress,
        protocol: StreamProtocol,
        timeout: Duration,
    ) -> Result<BoxedStream, OpenError> {
        trace!(%addr, %protocol, ?timeout, "Opening stream");
        match tokio::time::timeout(timeout, self.substrate.open_stream(addr.clone(), protocol))
            .await
        {
            Ok(result) => result.map_err(OpenError::Failed),
            Err(_) => Err(OpenError::Timeout(timeout)),
        }
    }

    /// Stop every accept loop. Streams already handed to handlers keep running.
    pub fn shutdown(&self) {
        for (protocol, task) in self.handlers.lock().drain() {
            debug!(%protocol, "Stopping accept loop");
            task.abort();
        }
    }
}

impl<S> Drop for Multiplexer<S> {
    fn drop(&mut self) {
        for (_, task) in self.handlers.lock().drain() {
            task.abort();
        }
    }
}
