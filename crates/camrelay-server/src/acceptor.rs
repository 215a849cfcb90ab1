//! Turns each upgraded WebSocket into a relay session.

use std::error::Error as StdError;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use camrelay_core::{CloseReason, SessionId, TransportError};
use camrelay_telemetry::names;
use camrelay_transport::MessagingContext;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::coordinator::{close_message, record_closed, Coordinator, Session, SessionReport};

pub struct Acceptor<C> {
    context: Arc<C>,
    coordinator: Coordinator,
    shutdown: CancellationToken,
}

impl<C: MessagingContext> Acceptor<C> {
    pub fn new(context: Arc<C>, coordinator: Coordinator, shutdown: CancellationToken) -> Self {
        Self { context, coordinator, shutdown }
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Run a session over an upgraded socket until it is torn down.
    pub async fn accept_socket(&self, socket: WebSocket) -> Result<SessionReport, TransportError> {
        let (client_tx, client_rx) = socket.split();
        self.accept(client_rx, client_tx).await
    }

    /// Register a session, open its endpoint pair and hand it to the
    /// coordinator. If the pair cannot be opened the client is closed
    /// (1011, or 1001 during shutdown) and the error returned; other
    /// sessions are unaffected.
    pub async fn accept<St, E, Sk>(
        &self,
        client_rx: St,
        mut client_tx: Sk,
    ) -> Result<SessionReport, TransportError>
    where
        St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: StdError + Send + Sync + 'static,
        Sk: Sink<Message> + Unpin + Send + 'static,
        Sk::Error: Display + Send,
    {
        let id = SessionId::new();
        let started = Instant::now();
        let registry = self.coordinator.registry();
        let metrics = self.coordinator.metrics();

        registry.register(&id);
        metrics.counter_inc(names::SESSIONS_OPENED_TOTAL, &[], 1);
        metrics.gauge_inc(names::SESSIONS_ACTIVE, &[], 1.0);
        info!(session_id = %id, "client connected");

        let pair = match self.context.open_pair(&id).await {
            Ok(pair) => pair,
            Err(e) => {
                let reason = if self.shutdown.is_cancelled() {
                    CloseReason::Shutdown
                } else {
                    CloseReason::from_setup_error(&e)
                };
                metrics.counter_inc(names::ENDPOINT_FAILURES_TOTAL, &[("kind", e.error_kind())], 1);
                warn!(session_id = %id, error = %e, %reason, "endpoint pair setup failed");

                let farewell = async {
                    client_tx.send(close_message(reason)).await?;
                    client_tx.close().await
                };
                if let Ok(Err(send_err)) =
                    tokio::time::timeout(self.coordinator.options().cancel_grace, farewell).await
                {
                    debug!(session_id = %id, error = %send_err, "close frame not delivered");
                }

                let _ = registry.finish(&id);
                record_closed(metrics, reason, started.elapsed());
                return Err(e);
            }
        };
        if let Some(reply_to) = &pair.reply_to {
            debug!(session_id = %id, reply_to = %reply_to, "inbound endpoint bound");
        }

        let session = Session {
            id,
            client_rx,
            client_tx,
            outbound: pair.outbound,
            inbound: pair.inbound,
        };
        Ok(self.coordinator.run(session, &self.shutdown).await)
    }
}
