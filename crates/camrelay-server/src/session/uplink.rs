//! Client → pipeline forwarding.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use camrelay_core::{Outcome, RelayError};
use camrelay_transport::FrameSink;
use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SessionStats;

/// What the uplink hands back to the coordinator.
pub struct UplinkExit<S, O> {
    pub outcome: Outcome,
    pub client: S,
    pub outbound: O,
}

enum Received<E> {
    Message(Message),
    End,
    Failed(E),
    Idle(Duration),
}

/// Forward binary frames from `client` to `outbound`, one at a time and in
/// order, until the client goes away, something fails, or `cancel` fires.
pub async fn run<S, E, O>(
    mut client: S,
    mut outbound: O,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
    stats: Arc<SessionStats>,
) -> UplinkExit<S, O>
where
    S: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: StdError + Send + Sync + 'static,
    O: FrameSink,
{
    let outcome = loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Outcome::Cancelled,
            received = next_message(&mut client, idle_timeout) => received,
        };

        let message = match received {
            Received::Message(message) => message,
            Received::End => {
                debug!("client stream ended");
                break Outcome::Disconnected;
            }
            Received::Failed(e) if is_disconnect(&e) => {
                debug!(error = %e, "client connection dropped");
                break Outcome::Disconnected;
            }
            Received::Failed(e) => break Outcome::Error(RelayError::Client(e.to_string())),
            Received::Idle(after) => break Outcome::Error(RelayError::IdleTimeout(after)),
        };

        match message {
            Message::Binary(frame) => {
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break Outcome::Cancelled,
                    sent = outbound.send_frame(frame) => sent,
                };
                if let Err(e) = sent {
                    break Outcome::Error(e.into());
                }
                stats.frame_up();
            }
            Message::Text(text) => {
                warn!(len = text.len(), "text message on uplink, only binary frames are forwarded");
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(frame) => {
                debug!(code = frame.as_ref().map(|f| f.code), "client sent close frame");
                break Outcome::Disconnected;
            }
        }
    };

    UplinkExit { outcome, client, outbound }
}

async fn next_message<S, E>(client: &mut S, idle_timeout: Option<Duration>) -> Received<E>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
{
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, client.next()).await {
            Ok(next) => next,
            Err(_) => return Received::Idle(limit),
        },
        None => client.next().await,
    };
    match next {
        Some(Ok(message)) => Received::Message(message),
        Some(Err(e)) => Received::Failed(e),
        None => Received::End,
    }
}

/// Whether a read error just means the peer went away.
fn is_disconnect(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(ws_err) = e.downcast_ref::<WsError>() {
            if matches!(
                ws_err,
                WsError::ConnectionClosed
                    | WsError::AlreadyClosed
                    | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
            ) {
                return true;
            }
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}
