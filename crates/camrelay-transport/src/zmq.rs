use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use camrelay_core::{SessionId, TransportError};
use tracing::{debug, warn};
use zeromq::{PullSocket, PushSocket, Socket, SocketRecv, SocketSend, ZmqError};

use crate::config::{EndpointConfig, InboundBinding};
use crate::envelope;
use crate::lease::{ChannelLease, ChannelTracker};
use crate::traits::{EndpointPair, FrameSink, MessagingContext, ResultSource};

/// ZeroMQ-backed messaging context, created once per process.
pub struct ZmqContext {
    config: EndpointConfig,
    tracker: ChannelTracker,
    terminated: AtomicBool,
}

impl ZmqContext {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            tracker: ChannelTracker::new(),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    fn inbound_address(&self) -> String {
        match &self.config.inbound {
            InboundBinding::Fixed(endpoint) => endpoint.clone(),
            InboundBinding::Ephemeral { host } => format!("tcp://{host}:0"),
        }
    }
}

#[async_trait]
impl MessagingContext for ZmqContext {
    type Outbound = ZmqOutbound;
    type Inbound = ZmqInbound;

    async fn open_pair(
        &self,
        session: &SessionId,
    ) -> Result<EndpointPair<ZmqOutbound, ZmqInbound>, TransportError> {
        if self.is_terminated() {
            return Err(TransportError::ContextTerminated);
        }

        // Bind first: a conflict must not leave a dangling connection.
        let address = self.inbound_address();
        let mut pull = PullSocket::new();
        let resolved = pull
            .bind(&address)
            .await
            .map_err(|e| bind_error(&address, e))?
            .to_string();
        let inbound = ZmqInbound {
            socket: pull,
            endpoint: resolved.clone(),
            _lease: self.tracker.lease(),
        };

        let target = &self.config.pipeline_endpoint;
        let mut push = PushSocket::new();
        let connected =
            tokio::time::timeout(self.config.connect_timeout, push.connect(target)).await;
        let failure = match connected {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(TransportError::Connect {
                endpoint: target.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Some(TransportError::ConnectTimeout {
                endpoint: target.clone(),
                timeout: self.config.connect_timeout,
            }),
        };
        if let Some(err) = failure {
            let _ = push.close().await;
            if let Err(close_err) = inbound.close().await {
                warn!(session_id = %session, error = %close_err, "failed to release inbound after connect failure");
            }
            return Err(err);
        }

        let reply_to = self.config.inbound.announces_reply_to().then(|| resolved.clone());
        debug!(session_id = %session, inbound = %resolved, outbound = %target, "endpoint pair open");

        Ok(EndpointPair {
            outbound: ZmqOutbound {
                socket: push,
                reply_to: reply_to.clone().map(Bytes::from),
                _lease: self.tracker.lease(),
            },
            inbound,
            reply_to,
        })
    }

    fn open_channels(&self) -> usize {
        self.tracker.open()
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

fn bind_error(endpoint: &str, err: ZmqError) -> TransportError {
    let in_use = match &err {
        ZmqError::Network(io) => io.kind() == io::ErrorKind::AddrInUse,
        other => other.to_string().to_lowercase().contains("in use"),
    };
    if in_use {
        TransportError::BindConflict { endpoint: endpoint.to_string() }
    } else {
        TransportError::Bind {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }
}

fn close_errors(
    errors: Vec<ZmqError>,
    wrap: fn(String) -> TransportError,
) -> Result<(), TransportError> {
    match errors.into_iter().next() {
        None => Ok(()),
        Some(first) => Err(wrap(format!("close: {first}"))),
    }
}

/// PUSH socket connected to the pipeline.
pub struct ZmqOutbound {
    socket: PushSocket,
    reply_to: Option<Bytes>,
    _lease: ChannelLease,
}

impl std::fmt::Debug for ZmqOutbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZmqOutbound").field("reply_to", &self.reply_to).finish()
    }
}

#[async_trait]
impl FrameSink for ZmqOutbound {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let msg = envelope::seal(self.reply_to.as_ref(), frame);
        self.socket
            .send(msg)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(self) -> Result<(), TransportError> {
        close_errors(self.socket.close().await, TransportError::Send)
    }
}

/// PULL socket bound for one session's results.
pub struct ZmqInbound {
    socket: PullSocket,
    endpoint: String,
    _lease: ChannelLease,
}

impl std::fmt::Debug for ZmqInbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZmqInbound").field("endpoint", &self.endpoint).finish()
    }
}

#[async_trait]
impl ResultSource for ZmqInbound {
    async fn recv_result(&mut self) -> Result<Bytes, TransportError> {
        let msg = self
            .socket
            .recv()
            .await
            .map_err(|e| TransportError::Recv(e.to_string()))?;
        Ok(envelope::concat(msg))
    }

    async fn close(self) -> Result<(), TransportError> {
        close_errors(self.socket.close().await, TransportError::Recv)
    }
}
