//! Session lifecycle: run both forwarders, let the first to stop decide the
//! session's fate, cancel the other, release everything.

use std::error::Error as StdError;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message};
use camrelay_core::{CloseReason, Direction, Outcome, RelayError, SessionId, SessionState};
use camrelay_telemetry::{names, MetricsRecorder};
use camrelay_transport::{FrameSink, ResultSource};
use futures::{Sink, SinkExt, Stream};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::downlink::{self, DownlinkExit};
use super::uplink::{self, UplinkExit};
use super::SessionStats;
use crate::registry::SessionRegistry;

/// Default bound on waiting for the surviving forwarder.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    pub cancel_grace: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cancel_grace: DEFAULT_CANCEL_GRACE,
            idle_timeout: None,
        }
    }
}

/// Everything one session owns: both halves of the client connection and
/// both channels of its endpoint pair.
pub struct Session<St, Sk, O, I> {
    pub id: SessionId,
    pub client_rx: St,
    pub client_tx: Sk,
    pub outbound: O,
    pub inbound: I,
}

/// How a session ended.
#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub id: SessionId,
    pub reason: CloseReason,
    /// The forwarder whose outcome decided the session's fate.
    pub first: Direction,
    #[serde(skip)]
    pub uplink: Outcome,
    #[serde(skip)]
    pub downlink: Outcome,
    pub frames_up: u64,
    pub messages_down: u64,
    pub duration: Duration,
    /// The survivor ignored cancellation and was aborted.
    pub survivor_aborted: bool,
    pub state: SessionState,
}

/// WebSocket close code sent to a client for a given teardown reason.
pub fn close_code(reason: CloseReason) -> u16 {
    match reason {
        CloseReason::ClientDisconnect | CloseReason::IdleTimeout => 1000,
        CloseReason::Shutdown => 1001,
        CloseReason::TransportError
        | CloseReason::EndpointBindConflict
        | CloseReason::EndpointUnavailable => 1011,
    }
}

pub fn close_message(reason: CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code(reason),
        reason: reason.as_str().into(),
    }))
}

/// Count a finished session, whether or not it ever became active.
pub(crate) fn record_closed(metrics: &MetricsRecorder, reason: CloseReason, duration: Duration) {
    metrics.counter_inc(names::SESSIONS_CLOSED_TOTAL, &[("reason", reason.as_str())], 1);
    metrics.gauge_inc(names::SESSIONS_ACTIVE, &[], -1.0);
    metrics.histogram_observe(names::SESSION_DURATION_SECONDS, &[], duration.as_secs_f64());
}

/// Result of joining a forwarder task.
enum Joined<T> {
    Finished(T),
    Failed(String),
    Aborted,
}

impl<T> From<Result<T, tokio::task::JoinError>> for Joined<T> {
    fn from(result: Result<T, tokio::task::JoinError>) -> Self {
        match result {
            Ok(value) => Self::Finished(value),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// Wait up to `grace` for a cancelled task, aborting it past that.
async fn settle<T>(mut handle: JoinHandle<T>, grace: Duration) -> Joined<T> {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(result) => result.into(),
        Err(_) => {
            handle.abort();
            let _ = handle.await;
            Joined::Aborted
        }
    }
}

enum First<U, D> {
    Uplink(Result<U, tokio::task::JoinError>),
    Downlink(Result<D, tokio::task::JoinError>),
}

/// Runs sessions to completion. Shared by every connection.
pub struct Coordinator {
    options: SessionOptions,
    registry: Arc<SessionRegistry>,
    metrics: Arc<MetricsRecorder>,
}

impl Coordinator {
    pub fn new(
        options: SessionOptions,
        registry: Arc<SessionRegistry>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self { options, registry, metrics }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Drive one session from `Active` to `Closed`.
    ///
    /// `shutdown` is the process-wide token; cancelling it ends the session
    /// with [`CloseReason::Shutdown`]. When this returns, both forwarder
    /// tasks have been joined and both channels released.
    pub async fn run<St, E, Sk, O, I>(
        &self,
        session: Session<St, Sk, O, I>,
        shutdown: &CancellationToken,
    ) -> SessionReport
    where
        St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: StdError + Send + Sync + 'static,
        Sk: Sink<Message> + Unpin + Send + 'static,
        Sk::Error: Display + Send,
        O: FrameSink,
        I: ResultSource,
    {
        let Session { id, client_rx, client_tx, outbound, inbound } = session;
        let span = info_span!("session", session_id = %id);
        let started = Instant::now();
        let grace = self.options.cancel_grace;
        let stats = Arc::new(SessionStats::new());

        let session_token = shutdown.child_token();
        let uplink_token = session_token.child_token();
        let downlink_token = session_token.child_token();

        let _ = self.registry.transition(&id, SessionState::Active);
        info!(parent: &span, idle_timeout = ?self.options.idle_timeout, "session active");

        let mut uplink_task = tokio::spawn(
            uplink::run(client_rx, outbound, self.options.idle_timeout, uplink_token.clone(), stats.clone())
                .instrument(span.clone()),
        );
        let mut downlink_task = tokio::spawn(
            downlink::run(client_tx, inbound, downlink_token.clone(), stats.clone())
                .instrument(span.clone()),
        );

        let first = tokio::select! {
            result = &mut uplink_task => First::Uplink(result),
            result = &mut downlink_task => First::Downlink(result),
        };
        let _ = self.registry.transition(&id, SessionState::Closing);

        let (first_direction, up, down): (_, Joined<UplinkExit<St, O>>, Joined<DownlinkExit<Sk, I>>) =
            match first {
                First::Uplink(result) => {
                    downlink_token.cancel();
                    (Direction::Uplink, result.into(), settle(downlink_task, grace).await)
                }
                First::Downlink(result) => {
                    uplink_token.cancel();
                    (Direction::Downlink, settle(uplink_task, grace).await, result.into())
                }
            };
        session_token.cancel();

        let survivor_aborted = match first_direction {
            Direction::Uplink => matches!(down, Joined::Aborted),
            Direction::Downlink => matches!(up, Joined::Aborted),
        };

        let (uplink_outcome, outbound, client_rx) = match up {
            Joined::Finished(exit) => (exit.outcome, Some(exit.outbound), Some(exit.client)),
            Joined::Failed(e) => (Outcome::Error(RelayError::TaskFailed(e)), None, None),
            Joined::Aborted => (Outcome::Cancelled, None, None),
        };
        let (downlink_outcome, inbound, client_tx) = match down {
            Joined::Finished(exit) => (exit.outcome, Some(exit.inbound), Some(exit.client)),
            Joined::Failed(e) => (Outcome::Error(RelayError::TaskFailed(e)), None, None),
            Joined::Aborted => (Outcome::Cancelled, None, None),
        };

        let winner = match first_direction {
            Direction::Uplink => &uplink_outcome,
            Direction::Downlink => &downlink_outcome,
        };
        let reason = CloseReason::from_outcome(winner);
        if let Outcome::Error(e) = winner {
            debug!(parent: &span, direction = %first_direction, kind = e.error_kind(), error = %e, "forwarder failed");
        }

        if let Some(outbound) = outbound {
            if let Err(e) = outbound.close().await {
                warn!(parent: &span, error = %e, "failed to close outbound channel");
            }
        }
        if let Some(inbound) = inbound {
            if let Err(e) = inbound.close().await {
                warn!(parent: &span, error = %e, "failed to close inbound channel");
            }
        }

        if !matches!(uplink_outcome, Outcome::Disconnected) {
            if let Some(mut client_tx) = client_tx {
                let farewell = async {
                    client_tx.send(close_message(reason)).await?;
                    client_tx.close().await
                };
                match tokio::time::timeout(grace, farewell).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(parent: &span, error = %e, "close frame not delivered"),
                    Err(_) => debug!(parent: &span, "close frame timed out"),
                }
            }
        }
        drop(client_rx);

        let duration = started.elapsed();
        let _ = self.registry.finish(&id);
        let frames_up = stats.frames_up();
        let messages_down = stats.messages_down();

        self.metrics.counter_inc(names::FRAMES_FORWARDED_TOTAL, &[("direction", "uplink")], frames_up);
        self.metrics.counter_inc(names::FRAMES_FORWARDED_TOTAL, &[("direction", "downlink")], messages_down);
        record_closed(&self.metrics, reason, duration);
        if survivor_aborted {
            self.metrics.counter_inc(names::SURVIVOR_ABORTS_TOTAL, &[], 1);
            warn!(parent: &span, grace_ms = grace.as_millis() as u64, "survivor ignored cancellation, aborted");
        }

        if reason.is_expected() {
            info!(
                parent: &span,
                %reason,
                first = %first_direction,
                uplink = %uplink_outcome,
                downlink = %downlink_outcome,
                frames_up,
                messages_down,
                duration_ms = duration.as_millis() as u64,
                "session closed"
            );
        } else {
            warn!(
                parent: &span,
                %reason,
                first = %first_direction,
                uplink = %uplink_outcome,
                downlink = %downlink_outcome,
                frames_up,
                messages_down,
                duration_ms = duration.as_millis() as u64,
                "session closed"
            );
        }

        SessionReport {
            id,
            reason,
            first: first_direction,
            uplink: uplink_outcome,
            downlink: downlink_outcome,
            frames_up,
            messages_down,
            duration,
            survivor_aborted,
            state: SessionState::Closed,
        }
    }
}
