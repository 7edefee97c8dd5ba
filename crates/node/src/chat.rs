//! Chat session: at most one chat stream per node.
//!
//! The first send opens the stream; later sends reuse it. A stream from a
//! third peer that arrives while one is active is closed straight away.
//!
//! Two peers that open to each other at the same time both settle on the
//! stream opened by the lower peer id. The side that keeps its own stream
//! still reads the other one until its opener closes it, so nothing written
//! in between is lost. Each stream gets a generation number so a read loop
//! that ends late can never tear down the session that replaced it.

use std::{sync::Arc, time::Duration};

use futures::{
    AsyncWriteExt, SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use parley_net_codec::{Framed, FramedRead, TextCodec};
use parley_net_substrate::{BoxedStream, InboundStream, Multiplexer, OpenError, Substrate};
use parley_primitives::{CHAT_PROTOCOL, PeerAddress, PeerId};
use tokio::{
    sync::{Mutex, broadcast},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{ChatError, NodeEvent};

type ChatFramed = Framed<BoxedStream, TextCodec>;

enum ChatState {
    NoStream,
    Active {
        peer: PeerId,
        /// We opened this stream.
        outbound: bool,
        generation: u64,
        sink: SplitSink<ChatFramed, String>,
        reader: JoinHandle<()>,
    },
}

struct Inner {
    state: ChatState,
    next_generation: u64,
}

/// The node's single chat session.
pub struct ChatSession<S> {
    mux: Arc<Multiplexer<S>>,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<NodeEvent>,
    open_timeout: Duration,
}

impl<S: Substrate> ChatSession<S> {
    pub(crate) fn new(
        mux: Arc<Multiplexer<S>>,
        events: broadcast::Sender<NodeEvent>,
        open_timeout: Duration,
    ) -> Self {
        Self {
            mux,
            inner: Arc::new(Mutex::new(Inner {
                state: ChatState::NoStream,
                next_generation: 0,
            })),
            events,
            open_timeout,
        }
    }

    /// The peer on the other end of the active stream, if any.
    pub async fn active_peer(&self) -> Option<PeerId> {
        match &self.inner.lock().await.state {
            ChatState::Active { peer, .. } => Some(*peer),
            ChatState::NoStream => None,
        }
    }

    /// Send `text`, opening a stream to `target` first if none is active.
    ///
    /// The session lock is held while opening, so concurrent sends share one
    /// stream.
    pub async fn send(&self, target: Option<&PeerAddress>, text: &str) -> Result<(), ChatError> {
        let mut inner = self.inner.lock().await;

        if matches!(inner.state, ChatState::NoStream) {
            let addr = target.ok_or(ChatError::NoDirectAddress)?;
            let peer = addr
                .peer_id()
                .ok_or_else(|| ChatError::OpenFailed(format!("{addr} does not name a peer")))?;
            debug!(%addr, "Opening chat stream");
            let stream = self
                .mux
                .open_stream(addr, CHAT_PROTOCOL, self.open_timeout)
                .await
                .map_err(|e| match e {
                    OpenError::Timeout(after) => ChatError::OpenTimeout(after),
                    OpenError::Failed(e) => ChatError::OpenFailed(e.to_string()),
                })?;
            self.activate(&mut inner, peer, stream, true);
        }

        match &mut inner.state {
            ChatState::Active { peer, sink, .. } => {
                // A failed write leaves the session as is; the read loop
                // notices a dead stream.
                sink.send(text.to_string()).await.map_err(|e| {
                    warn!(%peer, %e, "Chat write failed");
                    ChatError::Write(e)
                })
            }
            ChatState::NoStream => Err(ChatError::NoDirectAddress),
        }
    }

    /// Take an inbound chat stream, or reject it if a session with another
    /// peer is active.
    pub async fn accept(&self, inbound: InboundStream) {
        let InboundStream {
            peer_id: remote,
            stream,
        } = inbound;
        let local = self.mux.substrate().local_peer_id();
        let mut inner = self.inner.lock().await;

        let active = match &inner.state {
            ChatState::Active { peer, outbound, .. } => Some((*peer, *outbound)),
            ChatState::NoStream => None,
        };
        match active {
            None => {}
            Some((peer, outbound)) if peer == remote => {
                if outbound && local < remote {
                    debug!(%remote, "Simultaneous chat open, keeping our stream");
                    tokio::spawn(drain(remote, stream, self.events.clone()));
                    return;
                }
                debug!(%remote, outbound, "Replacing chat stream with the peer's");
                retire(&mut inner).await;
            }
            Some((peer, _)) => {
                info!(active = %peer, rejected = %remote, "Rejecting second chat stream");
                let _ = self.events.send(NodeEvent::ChatRejected { peer: remote });
                let mut stream = stream;
                if let Err(e) = stream.close().await {
                    debug!(%e, "Closing rejected chat stream failed");
                }
                return;
            }
        }
        self.activate(&mut inner, remote, stream, false);
    }

    /// Close the active stream, if any.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(peer) = retire(&mut inner).await {
            let _ = self.events.send(NodeEvent::ChatClosed { peer });
        }
    }

    fn activate(&self, inner: &mut Inner, peer: PeerId, stream: BoxedStream, outbound: bool) {
        let generation = inner.next_generation;
        inner.next_generation += 1;

        let (sink, stream) = Framed::new(stream, TextCodec::default()).split();
        info!(%peer, generation, outbound, "Chat stream open");
        let _ = self.events.send(NodeEvent::ChatOpened { peer });

        // The loop needs the lock we hold, so it cannot finish before the
        // state below is in place.
        let reader = tokio::spawn(read_loop(
            stream,
            peer,
            generation,
            self.inner.clone(),
            self.events.clone(),
        ));
        inner.state = ChatState::Active {
            peer,
            outbound,
            generation,
            sink,
            reader,
        };
    }
}

/// Close the active stream and stop its reader. Returns the peer it was with.
async fn retire(inner: &mut Inner) -> Option<PeerId> {
    let ChatState::Active {
        peer,
        mut sink,
        reader,
        ..
    } = std::mem::replace(&mut inner.state, ChatState::NoStream)
    else {
        return None;
    };
    if let Err(e) = sink.close().await {
        debug!(%peer, %e, "Closing chat stream failed");
    }
    reader.abort();
    Some(peer)
}

/// Deliver what arrives on a stream that lost a simultaneous open, until its
/// opener closes it. Session state is left alone.
async fn drain(peer: PeerId, stream: BoxedStream, events: broadcast::Sender<NodeEvent>) {
    let mut stream = FramedRead::new(stream, TextCodec::default());
    while let Some(Ok(text)) = stream.next().await {
        let _ = events.send(NodeEvent::ChatMessage { peer, text });
    }
    debug!(%peer, "Superseded chat stream drained");
}

/// Deliver every read until the stream ends, then return to `NoStream`.
async fn read_loop(
    mut stream: SplitStream<ChatFramed>,
    peer: PeerId,
    generation: u64,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<NodeEvent>,
) {
    while let Some(read) = stream.next().await {
        match read {
            Ok(text) => {
                let _ = events.send(NodeEvent::ChatMessage { peer, text });
            }
            Err(e) => {
                warn!(%peer, %e, "Chat stream failed");
                break;
            }
        }
    }

    let mut inner = inner.lock().await;
    let current = matches!(
        inner.state,
        ChatState::Active { generation: g, .. } if g == generation
    );
    if current {
        inner.state = ChatState::NoStream;
        info!(%peer, generation, "Chat stream closed");
        let _ = events.send(NodeEvent::ChatClosed { peer });
    }
}
