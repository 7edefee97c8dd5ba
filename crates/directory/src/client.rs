//! Peer-side directory client.

use std::{sync::Arc, time::Duration};

use auto_impl::auto_impl;
use futures::{SinkExt, StreamExt};
use parley_net_codec::{Framed, JsonCodec};
use parley_net_substrate::{BoxedStream, Multiplexer, OpenError, Substrate};
use parley_primitives::{
    Connection, DIRECTORY_QUERY_PROTOCOL, DIRECTORY_STORE_PROTOCOL, StreamProtocol,
    validate_directory_key,
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, trace};

use crate::{
    DirectoryError, DirectoryValue, QueryError, QueryRequest, QueryResponse, StoreError,
    StoreRequest, StoreResponse,
};

/// Source of the connection a directory request goes through.
#[auto_impl(&, Box, Arc)]
pub trait RelayLocator: Send + Sync {
    /// The relay connection to use, if any.
    fn relay_connection(&self) -> Option<Connection>;
}

/// Sends store and query requests to the relay, one stream per request.
pub struct DirectoryClient<S, L> {
    mux: Arc<Multiplexer<S>>,
    locator: L,
    timeout: Duration,
}

impl<S: Substrate, L: RelayLocator> DirectoryClient<S, L> {
    /// `timeout` bounds opening the stream and, separately, the exchange.
    pub fn new(mux: Arc<Multiplexer<S>>, locator: L, timeout: Duration) -> Self {
        Self {
            mux,
            locator,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Map `key` to `value` on the relay.
    pub async fn store(&self, key: &str, value: &DirectoryValue) -> Result<(), StoreError> {
        validate_directory_key(key)?;
        let request = StoreRequest {
            key: key.to_string(),
            value: value.as_str().to_string(),
        };

        let response: StoreResponse = self.request(DIRECTORY_STORE_PROTOCOL, request).await?;
        if response.success {
            debug!(%key, %value, "Stored directory entry");
            Ok(())
        } else {
            Err(DirectoryError::Rejected(response.error.unwrap_or_default()))
        }
    }

    /// Look `key` up on the relay.
    pub async fn query(&self, key: &str) -> Result<Option<DirectoryValue>, QueryError> {
        validate_directory_key(key)?;

        let response: QueryResponse = self
            .request(DIRECTORY_QUERY_PROTOCOL, QueryRequest::get(key))
            .await?;
        if !response.success {
            return Err(DirectoryError::Rejected(response.error.unwrap_or_default()));
        }

        // A missing `found` counts as not found.
        match (response.found.unwrap_or(false), response.value) {
            (true, Some(value)) => {
                debug!(%key, %value, "Directory hit");
                Ok(Some(DirectoryValue::new(value)))
            }
            (true, None) => Err(DirectoryError::MalformedResponse(
                "found without value".to_string(),
            )),
            (false, _) => {
                debug!(%key, "Directory miss");
                Ok(None)
            }
        }
    }

    async fn request<Req, Resp>(
        &self,
        protocol: StreamProtocol,
        request: Req,
    ) -> Result<Resp, DirectoryError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let relay = self.locator.relay_connection().ok_or(DirectoryError::NoRelay)?;
        let target = relay.remote_addr.clone().with_peer_id(relay.peer_id);
        trace!(%target, %protocol, "Opening directory stream");

        let stream = self
            .mux
            .open_stream(&target, protocol, self.timeout)
            .await
            .map_err(|e| match e {
                OpenError::Timeout(after) => DirectoryError::OpenTimeout(after),
                OpenError::Failed(e) => DirectoryError::OpenFailed(e.to_string()),
            })?;

        let mut framed = Framed::new(stream, JsonCodec::<Req, Resp>::default());
        let outcome = tokio::time::timeout(self.timeout, exchange(&mut framed, request))
            .await
            .unwrap_or(Err(DirectoryError::ResponseTimeout(self.timeout)));

        if let Err(e) = framed.close().await {
            trace!(%e, "Closing directory stream failed");
        }
        outcome
    }
}

async fn exchange<Req, Resp>(
    framed: &mut Framed<BoxedStream, JsonCodec<Req, Resp>>,
    request: Req,
) -> Result<Resp, DirectoryError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    framed.send(request).await.map_err(DirectoryError::Stream)?;
    match framed.next().await {
        Some(Ok(response)) => Ok(response),
        Some(Err(e)) if e.is_malformed() => Err(DirectoryError::MalformedResponse(e.to_string())),
        Some(Err(e)) => Err(DirectoryError::Stream(e)),
        None => Err(DirectoryError::NoResponse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DirectoryService, MemoryDirectoryStore};
    use assert_matches::assert_matches;
    use parley_net_substrate::memory::{MemoryNetwork, MemoryNode};
    use parley_primitives::{KeyViolation, PeerAddress};

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const BOB: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Locator that always returns the same connection.
    struct Fixed(Option<Connection>);

    impl RelayLocator for Fixed {
        fn relay_connection(&self) -> Option<Connection> {
            self.0.clone()
        }
    }

    struct Setup {
        _relay: Arc<Multiplexer<MemoryNode>>,
        client: DirectoryClient<MemoryNode, Fixed>,
        peer: MemoryNode,
    }

    async fn setup() -> Setup {
        let net = MemoryNetwork::new();
        let relay = Arc::new(Multiplexer::new(net.node(["/ip4/10.0.0.1/tcp/4001"])));
        let service = Arc::new(DirectoryService::new(MemoryDirectoryStore::new()));
        {
            let service = service.clone();
            relay
                .register_handler(DIRECTORY_STORE_PROTOCOL, move |s| {
                    let service = service.clone();
                    async move { service.serve_store(s).await }
                })
                .unwrap();
        }
        relay
            .register_handler(DIRECTORY_QUERY_PROTOCOL, move |s| {
                let service = service.clone();
                async move { service.serve_query(s).await }
            })
            .unwrap();

        let peer = net.node(["/ip4/10.0.0.2/udp/9/webrtc-direct"]);
        let conn = peer
            .dial(relay.substrate().listen_addresses()[0].clone())
            .await
            .unwrap();
        let client = client_for(peer.clone(), Some(conn));
        Setup {
            _relay: relay,
            client,
            peer,
        }
    }

    fn client_for(
        peer: MemoryNode,
        relay: Option<Connection>,
    ) -> DirectoryClient<MemoryNode, Fixed> {
        DirectoryClient::new(Arc::new(Multiplexer::new(peer)), Fixed(relay), TIMEOUT)
    }

    fn value(s: &str) -> DirectoryValue {
        DirectoryValue::from(s.parse::<PeerAddress>().unwrap())
    }

    #[tokio::test]
    async fn test_store_then_query() {
        let s = setup().await;
        let v = value("/ip4/1.2.3.4/udp/9/webrtc-direct");
        s.client.store(ALICE, &v).await.unwrap();
        assert_eq!(s.client.query(ALICE).await.unwrap(), Some(v));
    }

    #[tokio::test]
    async fn test_query_unknown_is_none() {
        let s = setup().await;
        assert_eq!(s.client.query(BOB).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let s = setup().await;
        s.client
            .store(ALICE, &value("/ip4/1.1.1.1/udp/1/webrtc-direct"))
            .await
            .unwrap();
        let newer = value("/ip4/2.2.2.2/udp/2/webrtc-direct");
        s.client.store(ALICE, &newer).await.unwrap();
        assert_eq!(s.client.query(ALICE).await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn test_invalid_key_fails_before_io() {
        let s = setup().await;
        let before = s.peer.connections().len();
        assert_matches!(
            s.client.store("not-a-key", &value("/ip4/1.1.1.1/tcp/1")).await,
            Err(DirectoryError::InvalidKey(KeyViolation::Length(9)))
        );
        assert_matches!(
            s.client.query("0GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY").await,
            Err(DirectoryError::InvalidKey(KeyViolation::Prefix('0')))
        );
        assert_eq!(s.peer.connections().len(), before);
    }

    #[tokio::test]
    async fn test_no_relay() {
        let net = MemoryNetwork::new();
        let client = client_for(net.node(["/ip4/10.0.0.2/tcp/1"]), None);
        assert_matches!(client.query(ALICE).await, Err(DirectoryError::NoRelay));
    }

    #[tokio::test]
    async fn test_relay_without_directory_is_open_failure() {
        let net = MemoryNetwork::new();
        let relay = net.node(["/ip4/10.0.0.1/tcp/4001"]);
        let peer = net.node(["/ip4/10.0.0.2/tcp/1"]);
        let conn = peer.dial(relay.listen_addresses()[0].clone()).await.unwrap();
        let client = client_for(peer, Some(conn));

        assert_matches!(client.query(ALICE).await, Err(DirectoryError::OpenFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_relay_times_out() {
        let net = MemoryNetwork::new();
        let relay = Multiplexer::new(net.node(["/ip4/10.0.0.1/tcp/4001"]));
        // Accept the stream and hold it open without answering.
        relay
            .register_handler(DIRECTORY_QUERY_PROTOCOL, |s| async move {
                let _hold = s;
                futures::future::pending::<()>().await;
            })
            .unwrap();
        let peer = net.node(["/ip4/10.0.0.2/tcp/1"]);
        let conn = peer
            .dial(relay.substrate().listen_addresses()[0].clone())
            .await
            .unwrap();
        let client = client_for(peer, Some(conn));

        assert_matches!(
            client.query(ALICE).await,
            Err(DirectoryError::ResponseTimeout(t)) if t == TIMEOUT
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_relay_open_timeout() {
        let net = MemoryNetwork::new();
        let relay = net.node(["/ip4/10.0.0.1/tcp/4001"]);
        let relay_addr = relay.listen_addresses()[0].clone();
        let peer = net.node(["/ip4/10.0.0.2/tcp/1"]);
        let conn = peer.dial(relay_addr.clone()).await.unwrap();
        // Drop the connection, then make redials hang.
        peer.disconnect(relay.local_peer_id());
        net.blackhole(&relay_addr);

        let client = client_for(peer, Some(conn));
        assert_matches!(
            client.store(ALICE, &value("/ip4/1.1.1.1/udp/1/webrtc-direct")).await,
            Err(DirectoryError::OpenTimeout(t)) if t == TIMEOUT
        );
    }

    #[tokio::test]
    async fn test_relay_closing_without_reply_is_no_response() {
        let net = MemoryNetwork::new();
        let relay = Multiplexer::new(net.node(["/ip4/10.0.0.1/tcp/4001"]));
        // Read the whole request, then hang up without answering.
        relay
            .register_handler(DIRECTORY_STORE_PROTOCOL, |s| async move {
                let mut framed =
                    Framed::new(s.stream, JsonCodec::<StoreResponse, StoreRequest>::default());
                let _request = framed.next().await;
            })
            .unwrap();
        let peer = net.node(["/ip4/10.0.0.2/tcp/1"]);
        let conn = peer
            .dial(relay.substrate().listen_addresses()[0].clone())
            .await
            .unwrap();
        let client = client_for(peer, Some(conn));

        let result = client
            .store(ALICE, &value("/ip4/1.1.1.1/udp/1/webrtc-direct"))
            .await;
        assert_matches!(result, Err(DirectoryError::NoResponse));
    }
}
