//! Relay-side directory service.
//!
//! Never drops a request silently: anything that arrives gets a structured
//! reply, including garbage and requests that stall half-sent.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parley_net_codec::{Framed, JsonCodec};
use parley_net_substrate::InboundStream;
use parley_primitives::DirectoryKey;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::{
    ACTION_GET, DirectoryStore, ERR_INVALID_KEY, ERR_MALFORMED_REQUEST, ERR_STORAGE,
    ERR_UNSUPPORTED_ACTION, QueryRequest, QueryResponse, StoreRequest, StoreResponse,
};

/// How long a requester may take to send one complete request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Serves store and query requests against a [`DirectoryStore`].
#[derive(Debug)]
pub struct DirectoryService<St> {
    store: St,
    request_timeout: Duration,
}

impl<St: DirectoryStore> DirectoryService<St> {
    pub fn new(store: St) -> Self {
        Self {
            store,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Apply one store request.
    pub fn handle_store(&self, request: StoreRequest) -> StoreResponse {
        let key = match DirectoryKey::parse(request.key) {
            Ok(key) => key,
            Err(violation) => {
                debug!(%violation, "Rejecting store with invalid key");
                return StoreResponse::failure(ERR_INVALID_KEY);
            }
        };

        match self.store.put(key.clone(), request.value) {
            Ok(previous) => {
                info!(%key, replaced = previous.is_some(), "Stored directory entry");
                StoreResponse::ok()
            }
            Err(e) => {
                warn!(%key, %e, "Failed to persist directory entry");
                StoreResponse::failure(ERR_STORAGE)
            }
        }
    }

    /// Answer one query request.
    pub fn handle_query(&self, request: QueryRequest) -> QueryResponse {
        if request.action != ACTION_GET {
            debug!(action = %request.action, "Rejecting unsupported query action");
            return QueryResponse::failure(ERR_UNSUPPORTED_ACTION);
        }

        // A key that cannot be valid cannot have been stored.
        let Ok(key) = DirectoryKey::parse(request.key) else {
            return QueryResponse::not_found();
        };

        match self.store.get(&key) {
            Ok(Some(value)) => {
                debug!(%key, "Directory hit");
                QueryResponse::found(value)
            }
            Ok(None) => {
                debug!(%key, "Directory miss");
                QueryResponse::not_found()
            }
            Err(e) => {
                warn!(%key, %e, "Failed to read directory entry");
                QueryResponse::failure(ERR_STORAGE)
            }
        }
    }

    /// Serve one store stream: read one request, reply once.
    pub async fn serve_store(&self, inbound: InboundStream) {
        serve_one(
            inbound,
            "store",
            self.request_timeout,
            StoreResponse::failure(ERR_MALFORMED_REQUEST),
            |req| self.handle_store(req),
        )
        .await
    }

    /// Serve one query stream: read one request, reply once.
    pub async fn serve_query(&self, inbound: InboundStream) {
        serve_one(
            inbound,
            "query",
            self.request_timeout,
            QueryResponse::failure(ERR_MALFORMED_REQUEST),
            |req| self.handle_query(req),
        )
        .await
    }
}

async fn serve_one<Req, Resp>(
    inbound: InboundStream,
    kind: &'static str,
    timeout: Duration,
    malformed: Resp,
    handle: impl FnOnce(Req) -> Resp,
) where
    Req: DeserializeOwned,
    Resp: Serialize,
{
    let peer_id = inbound.peer_id;
    let mut framed = Framed::new(inbound.stream, JsonCodec::<Resp, Req>::default());

    let response = match tokio::time::timeout(timeout, framed.next()).await {
        Ok(Some(Ok(request))) => handle(request),
        Ok(Some(Err(e))) if e.is_malformed() => {
            debug!(%peer_id, kind, %e, "Malformed directory request");
            malformed
        }
        Ok(Some(Err(e))) => {
            warn!(%peer_id, kind, %e, "Directory stream failed before request");
            return;
        }
        Ok(None) => {
            debug!(%peer_id, kind, "Directory stream closed before request");
            return;
        }
        Err(_) => {
            debug!(%peer_id, kind, ?timeout, "Directory request incomplete, giving up");
            malformed
        }
    };

    if let Err(e) = framed.send(response).await {
        warn!(%peer_id, kind, %e, "Failed to send directory response");
        return;
    }
    if let Err(e) = framed.close().await {
        debug!(%peer_id, kind, %e, "Failed to close directory stream");
    }
}
