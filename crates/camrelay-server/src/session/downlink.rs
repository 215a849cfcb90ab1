//! Pipeline → client forwarding.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes};
use bytes::Bytes;
use camrelay_core::{Outcome, RelayError};
use camrelay_transport::ResultSource;
use futures::{Sink, SinkExt};
use tokio_util::sync::CancellationToken;

use super::SessionStats;

/// What the downlink hands back to the coordinator.
pub struct DownlinkExit<K, I> {
    pub outcome: Outcome,
    pub client: K,
    pub inbound: I,
}

/// One result becomes one WebSocket message: text when the payload is
/// UTF-8, binary otherwise. The bytes are not altered.
pub fn encode_result(payload: Bytes) -> Message {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(payload),
    }
}

/// Forward results from `inbound` to `client` in arrival order until
/// cancelled or a write fails. Waiting for results never times out.
pub async fn run<K, I>(
    mut client: K,
    mut inbound: I,
    cancel: CancellationToken,
    stats: Arc<SessionStats>,
) -> DownlinkExit<K, I>
where
    K: Sink<Message> + Unpin + Send,
    K::Error: Display,
    I: ResultSource,
{
    let outcome = loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Outcome::Cancelled,
            received = inbound.recv_result() => received,
        };
        let payload = match received {
            Ok(payload) => payload,
            Err(e) => break Outcome::Error(e.into()),
        };

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Outcome::Cancelled,
            sent = client.send(encode_result(payload)) => sent,
        };
        if let Err(e) = sent {
            break Outcome::Error(RelayError::Client(e.to_string()));
        }
        stats.message_down();
    };

    DownlinkExit { outcome, client, inbound }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use camrelay_core::{SessionId, TransportError};
    use camrelay_transport::{InProcContext, InboundBinding, MessagingContext, PipelineHandle};
    use futures::channel::mpsc;
    use futures::StreamExt;

    const ROUTE: &str = "inproc://test/sess_down";

    async fn pair() -> (InProcContext, PipelineHandle, camrelay_transport::inproc::InProcInbound) {
        let (ctx, pipeline) =
            InProcContext::new(InboundBinding::Ephemeral { host: "test".into() });
        let pair = ctx.open_pair(&SessionId::from_raw("sess_down")).await.unwrap();
        (ctx, pipeline, pair.inbound)
    }

    #[test]
    fn utf8_results_become_text() {
        match encode_result(Bytes::from_static(br#"{"caption":"x"}"#)) {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{"caption":"x"}"#),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn text_results_share_the_received_buffer() {
        let payload = Bytes::from(format!(r#"{{"image":"{}"}}"#, "A".repeat(64 * 1024)));
        let start = payload.as_ptr();
        match encode_result(payload) {
            Message::Text(text) => assert_eq!(text.as_str().as_ptr(), start),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn non_utf8_results_stay_binary() {
        match encode_result(Bytes::from_static(b"\xff\x00\xfe")) {
            Message::Binary(bytes) => assert_eq!(&bytes[..], b"\xff\x00\xfe"),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn burst_is_delivered_in_order() {
        let (_ctx, pipeline, inbound) = pair().await;
        let (tx, mut rx) = mpsc::channel::<Message>(64);
        let stats = Arc::new(SessionStats::new());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(tx, inbound, cancel.clone(), stats.clone()));

        for i in 0..10 {
            pipeline.reply(ROUTE, format!("result-{i}")).await.unwrap();
        }
        for i in 0..10 {
            match rx.next().await.unwrap() {
                Message::Text(text) => assert_eq!(text.as_str(), format!("result-{i}")),
                other => panic!("unexpected {other:?}"),
            }
        }

        cancel.cancel();
        let exit = task.await.unwrap();
        assert_eq!(exit.outcome, Outcome::Cancelled);
        assert_eq!(stats.messages_down(), 10);
    }

    #[tokio::test]
    async fn silence_is_not_an_error() {
        let (_ctx, _pipeline, inbound) = pair().await;
        let (tx, _rx) = mpsc::channel::<Message>(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(tx, inbound, cancel.clone(), Arc::default()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(exit.outcome, Outcome::Cancelled);
    }

    #[tokio::test]
    async fn client_write_failure_is_an_error() {
        let (_ctx, pipeline, inbound) = pair().await;
        let (tx, rx) = mpsc::channel::<Message>(1);
        drop(rx);
        let task = tokio::spawn(run(tx, inbound, CancellationToken::new(), Arc::default()));
        pipeline.reply(ROUTE, "lost").await.unwrap();
        let outcome = task.await.unwrap().outcome;
        assert!(matches!(outcome, Outcome::Error(RelayError::Client(_))), "{outcome:?}");
    }

    #[tokio::test]
    async fn channel_failure_is_an_error() {
        let (_ctx, pipeline, inbound) = pair().await;
        let (tx, _rx) = mpsc::channel::<Message>(1);
        let task = tokio::spawn(run(tx, inbound, CancellationToken::new(), Arc::default()));
        assert!(pipeline.drop_route(ROUTE));
        assert_eq!(
            task.await.unwrap().outcome,
            Outcome::Error(RelayError::Transport(TransportError::Closed))
        );
    }

    #[tokio::test]
    async fn cancellation_while_client_is_slow() {
        let (_ctx, pipeline, inbound) = pair().await;
        // Capacity 0 plus one sender slot: the second send parks.
        let (tx, _rx) = mpsc::channel::<Message>(0);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(tx, inbound, cancel.clone(), Arc::default()));
        for i in 0..3 {
            pipeline.reply(ROUTE, format!("r{i}")).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(exit.outcome, Outcome::Cancelled);
    }
}
