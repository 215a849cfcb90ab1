//! Full chain on loopback: WebSocket client, relay server, ZeroMQ, worker.

use std::sync::Arc;
use std::time::Duration;

use camrelay_pipeline::{PlaceholderAnalyzer, Worker, WorkerConfig};
use camrelay_server::ServerConfig;
use camrelay_telemetry::MetricsRecorder;
use camrelay_transport::{EndpointConfig, InboundBinding, MessagingContext, ZmqContext};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const STEP: Duration = Duration::from_secs(5);
const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

#[tokio::test]
async fn frames_are_captioned_end_to_end() {
    let metrics = Arc::new(MetricsRecorder::new());

    let worker = Worker::bind(
        WorkerConfig {
            frames_endpoint: "tcp://127.0.0.1:0".into(),
            results_endpoint: "tcp://127.0.0.1:1".into(),
            reply_timeout: Duration::from_secs(1),
        },
        PlaceholderAnalyzer::new("end to end", 1024),
        metrics.clone(),
    )
    .await
    .unwrap();
    let context = Arc::new(ZmqContext::new(EndpointConfig {
        pipeline_endpoint: worker.endpoint().to_string(),
        inbound: InboundBinding::Ephemeral { host: "127.0.0.1".into() },
        connect_timeout: Duration::from_secs(2),
    }));
    let cancel = CancellationToken::new();
    let worker_task = tokio::spawn(worker.run(cancel.clone()));

    let server = camrelay_server::start(
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..Default::default()
        },
        context.clone(),
        metrics,
    )
    .await
    .unwrap();

    let url = format!("ws://{}/ws", server.local_addr());
    let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    client.send(Message::binary(JPEG.to_vec())).await.unwrap();
    let reply = match tokio::time::timeout(STEP, client.next()).await.unwrap() {
        Some(Ok(Message::Text(text))) => text.as_str().to_string(),
        other => panic!("expected text, got {other:?}"),
    };
    let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(reply["success"], true);
    assert_eq!(reply["caption"], "end to end");
    assert!(reply["image"].as_str().unwrap().starts_with("data:image/jpeg;base64,"));

    client.send(Message::binary(b"no image here".to_vec())).await.unwrap();
    let reply = match tokio::time::timeout(STEP, client.next()).await.unwrap() {
        Some(Ok(Message::Text(text))) => text.as_str().to_string(),
        other => panic!("expected text, got {other:?}"),
    };
    let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(reply["success"], false);

    client.close(None).await.unwrap();
    let deadline = tokio::time::Instant::now() + STEP;
    while context.open_channels() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "session channels not released");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(server.shutdown(Duration::from_secs(2)).await);
    cancel.cancel();
    let stats = worker_task.await.unwrap().unwrap();
    assert_eq!(stats.replied, 1);
    assert_eq!(stats.rejected, 1);
}
