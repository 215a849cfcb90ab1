use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use camrelay_settings::WorkerSettings;
use camrelay_telemetry::{names, MetricsRecorder};
use camrelay_transport::envelope;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeromq::{PullSocket, PushSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::analyzer::{encode_result, Analyzer};
use crate::errors::PipelineError;

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// PULL bind address for frames.
    pub frames_endpoint: String,
    /// Reply target for frames that carry no `reply_to`.
    pub results_endpoint: String,
    /// Bound on connecting to a reply address and sending one result.
    pub reply_timeout: Duration,
}

impl From<&WorkerSettings> for WorkerConfig {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            frames_endpoint: settings.frames_endpoint.clone(),
            results_endpoint: settings.results_endpoint.clone(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

/// Per-run frame counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub received: u64,
    /// Analysed and answered with a success result.
    pub replied: u64,
    /// Answered with a failure result.
    pub rejected: u64,
    /// Result could not be delivered.
    pub undeliverable: u64,
    /// Not a valid frame message; dropped.
    pub malformed: u64,
}

/// Push one result to `endpoint` over a connection of its own. Whoever
/// listens there now may not be whoever listened for the previous result.
async fn deliver(endpoint: &str, payload: Bytes, timeout: Duration) -> Result<(), PipelineError> {
    let mut socket = PushSocket::new();
    let sent = tokio::time::timeout(timeout, async {
        socket.connect(endpoint).await?;
        socket.send(ZmqMessage::from(payload)).await
    })
    .await;
    let _ = socket.close().await;
    let reason = match sent {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("timed out after {timeout:?}"),
    };
    Err(PipelineError::Reply {
        endpoint: endpoint.to_string(),
        reason,
    })
}

/// Pulls frames, analyses them and pushes one result per frame.
pub struct Worker<A> {
    analyzer: A,
    config: WorkerConfig,
    pull: PullSocket,
    endpoint: String,
    metrics: Arc<MetricsRecorder>,
    stats: WorkerStats,
}

impl<A: Analyzer> Worker<A> {
    /// Bind the frames endpoint. Port 0 resolves to a free port, see
    /// [`Worker::endpoint`].
    pub async fn bind(
        config: WorkerConfig,
        analyzer: A,
        metrics: Arc<MetricsRecorder>,
    ) -> Result<Self, PipelineError> {
        let mut pull = PullSocket::new();
        let endpoint = pull
            .bind(&config.frames_endpoint)
            .await
            .map_err(|e| PipelineError::Bind {
                endpoint: config.frames_endpoint.clone(),
                reason: e.to_string(),
            })?
            .to_string();
        Ok(Self {
            analyzer,
            config,
            pull,
            endpoint,
            metrics,
            stats: WorkerStats::default(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Serve until `cancel` fires or the frames socket fails.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<WorkerStats, PipelineError> {
        info!(
            endpoint = %self.endpoint,
            results_endpoint = %self.config.results_endpoint,
            "pipeline worker listening"
        );
        let result = loop {
            let msg = tokio::select! {
                biased;
                () = cancel.cancelled() => break Ok(()),
                msg = self.pull.recv() => msg,
            };
            match msg {
                Ok(msg) => self.handle(msg).await,
                Err(e) => break Err(PipelineError::Recv(e.to_string())),
            }
        };

        let _ = self.pull.close().await;
        let stats = self.stats;
        match &result {
            Ok(()) => info!(?stats, "pipeline worker stopped"),
            Err(e) => warn!(?stats, error = %e, "pipeline worker failed"),
        }
        result.map(|()| stats)
    }

    async fn handle(&mut self, msg: ZmqMessage) {
        self.stats.received += 1;
        let (reply_to, frame) = match envelope::open(msg) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame message");
                self.stats.malformed += 1;
                self.record("malformed");
                return;
            }
        };
        let target = reply_to.unwrap_or_else(|| self.config.results_endpoint.clone());
        let frame_len = frame.len();

        let result = self.analyzer.analyze(frame).await;
        if let Err(e) = &result {
            debug!(reply_to = %target, frame_len, error = %e, "frame rejected");
        }
        let payload = encode_result(&result);

        match deliver(&target, payload, self.config.reply_timeout).await {
            Ok(()) if result.is_ok() => {
                self.stats.replied += 1;
                self.record("ok");
            }
            Ok(()) => {
                self.stats.rejected += 1;
                self.record("rejected");
            }
            Err(e) => {
                warn!(error = %e, "result undeliverable");
                self.stats.undeliverable += 1;
                self.record("undeliverable");
            }
        }
    }

    fn record(&self, outcome: &str) {
        self.metrics
            .counter_inc(names::WORKER_FRAMES_TOTAL, &[("outcome", outcome)], 1);
    }
}

impl<A> std::fmt::Debug for Worker<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("endpoint", &self.endpoint)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::PlaceholderAnalyzer;

    fn config(frames_endpoint: &str) -> WorkerConfig {
        WorkerConfig {
            frames_endpoint: frames_endpoint.to_string(),
            results_endpoint: "tcp://127.0.0.1:5556".to_string(),
            reply_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn config_from_settings() {
        let config = WorkerConfig::from(&WorkerSettings::default());
        assert_eq!(config.frames_endpoint, "tcp://127.0.0.1:5555");
        assert_eq!(config.results_endpoint, "tcp://127.0.0.1:5556");
        assert_eq!(config.reply_timeout, DEFAULT_REPLY_TIMEOUT);
    }

    #[tokio::test]
    async fn bind_resolves_port_zero() {
        let worker = Worker::bind(
            config("tcp://127.0.0.1:0"),
            PlaceholderAnalyzer::new("c", 1024),
            Arc::new(MetricsRecorder::new()),
        )
        .await
        .unwrap();
        assert!(worker.endpoint().starts_with("tcp://127.0.0.1:"));
        assert!(!worker.endpoint().ends_with(":0"));
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = Worker::bind(
            config("tcp://127.0.0.1:0"),
            PlaceholderAnalyzer::new("c", 1024),
            Arc::new(MetricsRecorder::new()),
        )
        .await
        .unwrap();
        let err = Worker::bind(
            config(first.endpoint()),
            PlaceholderAnalyzer::new("c", 1024),
            Arc::new(MetricsRecorder::new()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Bind { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn cancel_stops_idle_worker() {
        let worker = Worker::bind(
            config("tcp://127.0.0.1:0"),
            PlaceholderAnalyzer::new("c", 1024),
            Arc::new(MetricsRecorder::new()),
        )
        .await
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = worker.run(cancel).await.unwrap();
        assert_eq!(stats, WorkerStats::default());
    }
}
