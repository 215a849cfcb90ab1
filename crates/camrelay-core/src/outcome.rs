use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{RelayError, TransportError};

/// Terminal result of one forwarder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The client closed the connection.
    Disconnected,
    /// The forwarder observed its cancellation token.
    Cancelled,
    Error(RelayError),
}

impl Outcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Cancelled => "cancelled",
            Self::Error(_) => "error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "error: {e}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Which forwarder of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Client → pipeline.
    Uplink,
    /// Pipeline → client.
    Downlink,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uplink => "uplink",
            Self::Downlink => "downlink",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    Active,
    Closing,
    Closed,
}

/// Why a session was torn down, derived from the first forwarder to finish.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    ClientDisconnect,
    TransportError,
    EndpointBindConflict,
    EndpointUnavailable,
    IdleTimeout,
    Shutdown,
}

impl CloseReason {
    /// Classify the winning forwarder's outcome.
    pub fn from_outcome(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Disconnected => Self::ClientDisconnect,
            Outcome::Cancelled => Self::Shutdown,
            Outcome::Error(RelayError::IdleTimeout(_)) => Self::IdleTimeout,
            Outcome::Error(_) => Self::TransportError,
        }
    }

    /// Classify a failure to open the endpoint pair.
    pub fn from_setup_error(err: &TransportError) -> Self {
        match err {
            TransportError::BindConflict { .. } => Self::EndpointBindConflict,
            _ => Self::EndpointUnavailable,
        }
    }

    /// Expected closes are logged at info, the rest at warn.
    pub fn is_expected(self) -> bool {
        matches!(self, Self::ClientDisconnect | Self::Shutdown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientDisconnect => "client_disconnect",
            Self::TransportError => "transport_error",
            Self::EndpointBindConflict => "endpoint_bind_conflict",
            Self::EndpointUnavailable => "endpoint_unavailable",
            Self::IdleTimeout => "idle_timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
