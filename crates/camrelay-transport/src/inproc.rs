//! In-process endpoint pairs.
//!
//! Frames from every session land on one queue drained through a
//! [`PipelineHandle`]; results are routed back by routing key, the in-process
//! analogue of an inbound address.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use camrelay_core::{SessionId, TransportError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::config::InboundBinding;
use crate::lease::{ChannelLease, ChannelTracker};
use crate::traits::{EndpointPair, FrameSink, MessagingContext, ResultSource};

/// Queue depth for frames and for each route.
pub const DEFAULT_CAPACITY: usize = 64;

const PIPELINE_ENDPOINT: &str = "inproc://pipeline";

/// A frame as the pipeline sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineFrame {
    pub reply_to: Option<String>,
    pub payload: Bytes,
}

struct Shared {
    binding: InboundBinding,
    frames: mpsc::Sender<PipelineFrame>,
    routes: DashMap<String, mpsc::Sender<Bytes>>,
    tracker: ChannelTracker,
    terminated: AtomicBool,
    capacity: usize,
}

/// In-process messaging context.
///
/// Routing keys: `Fixed(key)` is used verbatim for every session,
/// `Ephemeral { host }` becomes `inproc://<host>/<session id>`.
#[derive(Clone)]
pub struct InProcContext {
    shared: Arc<Shared>,
}

impl InProcContext {
    pub fn new(binding: InboundBinding) -> (Self, PipelineHandle) {
        Self::with_capacity(binding, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(binding: InboundBinding, capacity: usize) -> (Self, PipelineHandle) {
        let capacity = capacity.max(1);
        let (frames_tx, frames_rx) = mpsc::channel(capacity);
        let shared = Arc::new(Shared {
            binding,
            frames: frames_tx,
            routes: DashMap::new(),
            tracker: ChannelTracker::new(),
            terminated: AtomicBool::new(false),
            capacity,
        });
        let handle = PipelineHandle {
            frames: frames_rx,
            shared: shared.clone(),
        };
        (Self { shared }, handle)
    }

    fn route_key(&self, session: &SessionId) -> String {
        match &self.shared.binding {
            InboundBinding::Fixed(key) => key.clone(),
            InboundBinding::Ephemeral { host } => format!("inproc://{host}/{session}"),
        }
    }
}

#[async_trait]
impl MessagingContext for InProcContext {
    type Outbound = InProcOutbound;
    type Inbound = InProcInbound;

    async fn open_pair(
        &self,
        session: &SessionId,
    ) -> Result<EndpointPair<InProcOutbound, InProcInbound>, TransportError> {
        if self.is_terminated() {
            return Err(TransportError::ContextTerminated);
        }

        let key = self.route_key(session);
        let (tx, rx) = mpsc::channel(self.shared.capacity);
        match self.shared.routes.entry(key.clone()) {
            Entry::Occupied(_) => return Err(TransportError::BindConflict { endpoint: key }),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        let inbound = InProcInbound {
            rx,
            key: key.clone(),
            shared: self.shared.clone(),
            _lease: self.shared.tracker.lease(),
        };

        if self.shared.frames.is_closed() {
            drop(inbound);
            return Err(TransportError::Connect {
                endpoint: PIPELINE_ENDPOINT.to_string(),
                reason: "pipeline handle dropped".to_string(),
            });
        }

        let reply_to = self.shared.binding.announces_reply_to().then_some(key);
        Ok(EndpointPair {
            outbound: InProcOutbound {
                frames: self.shared.frames.clone(),
                reply_to: reply_to.clone(),
                _lease: self.shared.tracker.lease(),
            },
            inbound,
            reply_to,
        })
    }

    fn open_channels(&self) -> usize {
        self.shared.tracker.open()
    }

    fn terminate(&self) {
        self.shared.terminated.store(true, Ordering::SeqCst);
    }

    fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct InProcOutbound {
    frames: mpsc::Sender<PipelineFrame>,
    reply_to: Option<String>,
    _lease: ChannelLease,
}

#[async_trait]
impl FrameSink for InProcOutbound {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let frame = PipelineFrame {
            reply_to: self.reply_to.clone(),
            payload: frame,
        };
        self.frames.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn close(self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Result queue for one session. Dropping it frees the routing key.
pub struct InProcInbound {
    rx: mpsc::Receiver<Bytes>,
    key: String,
    shared: Arc<Shared>,
    _lease: ChannelLease,
}

impl InProcInbound {
    pub fn route(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for InProcInbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcInbound").field("key", &self.key).finish()
    }
}

impl Drop for InProcInbound {
    fn drop(&mut self) {
        let _ = self.shared.routes.remove(&self.key);
    }
}

#[async_trait]
impl ResultSource for InProcInbound {
    async fn recv_result(&mut self) -> Result<Bytes, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }

    async fn close(self) -> Result<(), TransportError> {
        drop(self);
        Ok(())
    }
}

/// The pipeline's end of an [`InProcContext`].
pub struct PipelineHandle {
    frames: mpsc::Receiver<PipelineFrame>,
    shared: Arc<Shared>,
}

impl PipelineHandle {
    /// Next frame from any session, in arrival order.
    pub async fn next_frame(&mut self) -> Option<PipelineFrame> {
        self.frames.recv().await
    }

    pub fn try_next_frame(&mut self) -> Option<PipelineFrame> {
        self.frames.try_recv().ok()
    }

    /// Deliver a result to whichever session currently holds `route`.
    pub async fn reply(&self, route: &str, payload: impl Into<Bytes>) -> Result<(), TransportError> {
        let tx = self
            .shared
            .routes
            .get(route)
            .map(|entry| entry.value().clone())
            .ok_or(TransportError::Closed)?;
        tx.send(payload.into()).await.map_err(|_| TransportError::Closed)
    }

    /// Bound routing keys, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shared.routes.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Forget a route, so its session sees the channel close.
    pub fn drop_route(&self, route: &str) -> bool {
        self.shared.routes.remove(route).is_some()
    }
}
