use std::time::Duration;

/// Failures of the messaging side of a session: binding, connecting,
/// sending to or receiving from a pipeline channel.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("inbound endpoint already bound: {endpoint}")]
    BindConflict { endpoint: String },
    #[error("failed to bind inbound endpoint {endpoint}: {reason}")]
    Bind { endpoint: String, reason: String },
    #[error("failed to connect to pipeline at {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("timed out after {timeout:?} connecting to pipeline at {endpoint}")]
    ConnectTimeout { endpoint: String, timeout: Duration },
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Recv(String),
    #[error("channel closed")]
    Closed,
    #[error("messaging context terminated")]
    ContextTerminated,
}

impl TransportError {
    /// Whether the failure happened while setting up an endpoint pair
    /// rather than while forwarding.
    pub fn is_endpoint_setup(&self) -> bool {
        matches!(
            self,
            Self::BindConflict { .. }
                | Self::Bind { .. }
                | Self::Connect { .. }
                | Self::ConnectTimeout { .. }
                | Self::ContextTerminated
        )
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::BindConflict { .. } => "bind_conflict",
            Self::Bind { .. } => "bind",
            Self::Connect { .. } => "connect",
            Self::ConnectTimeout { .. } => "connect_timeout",
            Self::Send(_) => "send",
            Self::Recv(_) => "recv",
            Self::Closed => "closed",
            Self::ContextTerminated => "context_terminated",
        }
    }
}

/// Why a forwarder stopped with `Outcome::Error`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("client transport error: {0}")]
    Client(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("client idle for {0:?}")]
    IdleTimeout(Duration),
    #[error("forwarder task failed: {0}")]
    TaskFailed(String),
}

impl RelayError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Client(_) => "client",
            Self::Transport(e) => e.error_kind(),
            Self::IdleTimeout(_) => "idle_timeout",
            Self::TaskFailed(_) => "task_failed",
        }
    }
}
