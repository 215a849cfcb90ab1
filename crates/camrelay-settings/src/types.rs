//! Settings types.
//!
//! Every struct derives `Default` and uses `#[serde(default)]` so a partial
//! settings file fills the rest from compiled defaults. Field names are
//! camelCase on disk.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the bridge and the pipeline worker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    pub server: ServerSettings,
    pub pipeline: PipelineSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
    pub worker: WorkerSettings,
}

impl RelaySettings {
    /// Reject values that would make the bridge unusable.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("server.host must not be empty".into()));
        }
        if self.server.max_frame_bytes == 0 {
            return Err(SettingsError::InvalidValue("server.maxFrameBytes must be > 0".into()));
        }
        if self.server.shutdown_grace_ms == 0 {
            return Err(SettingsError::InvalidValue("server.shutdownGraceMs must be > 0".into()));
        }
        if self.session.cancel_grace_ms == 0 {
            return Err(SettingsError::InvalidValue("session.cancelGraceMs must be > 0".into()));
        }
        if self.pipeline.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue("pipeline.connectTimeoutMs must be > 0".into()));
        }
        check_endpoint("pipeline.framesEndpoint", &self.pipeline.frames_endpoint)?;
        match self.pipeline.inbound.mode {
            InboundMode::Fixed => {
                check_endpoint("pipeline.inbound.fixedEndpoint", &self.pipeline.inbound.fixed_endpoint)?;
            }
            InboundMode::Ephemeral => {
                if self.pipeline.inbound.ephemeral_host.trim().is_empty() {
                    return Err(SettingsError::InvalidValue(
                        "pipeline.inbound.ephemeralHost must not be empty".into(),
                    ));
                }
            }
        }
        check_endpoint("worker.framesEndpoint", &self.worker.frames_endpoint)?;
        check_endpoint("worker.resultsEndpoint", &self.worker.results_endpoint)?;
        if self.worker.max_image_bytes == 0 {
            return Err(SettingsError::InvalidValue("worker.maxImageBytes must be > 0".into()));
        }
        Ok(())
    }
}

/// Endpoints must look like `tcp://host:port`.
fn check_endpoint(field: &str, endpoint: &str) -> Result<()> {
    let Some(rest) = endpoint.strip_prefix("tcp://") else {
        return Err(SettingsError::InvalidValue(format!(
            "{field} must start with tcp:// (got {endpoint:?})"
        )));
    };
    let valid = rest
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if valid {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue(format!(
            "{field} must be tcp://<host>:<port> (got {endpoint:?})"
        )))
    }
}

/// HTTP / WebSocket listener.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Directory served at `/` when set.
    pub static_dir: Option<String>,
    /// Largest WebSocket message accepted from a client.
    pub max_frame_bytes: usize,
    /// Bounded wait for sessions to drain on shutdown.
    pub shutdown_grace_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            static_dir: None,
            max_frame_bytes: 10 * 1024 * 1024,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl ServerSettings {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Where the bridge sends frames and how it receives results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// PUSH target for frames.
    pub frames_endpoint: String,
    pub connect_timeout_ms: u64,
    pub inbound: InboundSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frames_endpoint: "tcp://127.0.0.1:5555".to_string(),
            connect_timeout_ms: 5_000,
            inbound: InboundSettings::default(),
        }
    }
}

impl PipelineSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// How each session's result channel is bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundMode {
    /// Bind `tcp://<ephemeralHost>:0` per session and announce it as `reply_to`.
    #[default]
    Ephemeral,
    /// Every session binds `fixedEndpoint`; only one may be active at a time.
    Fixed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundSettings {
    pub mode: InboundMode,
    pub fixed_endpoint: String,
    pub ephemeral_host: String,
}

impl Default for InboundSettings {
    fn default() -> Self {
        Self {
            mode: InboundMode::Ephemeral,
            fixed_endpoint: "tcp://127.0.0.1:5556".to_string(),
            ephemeral_host: "127.0.0.1".to_string(),
        }
    }
}

/// Per-session timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// How long the surviving forwarder gets to acknowledge cancellation.
    pub cancel_grace_ms: u64,
    /// Close the session when the client sends nothing for this long.
    /// `None` disables the timeout.
    pub idle_timeout_ms: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { cancel_grace_ms: 2_000, idle_timeout_ms: None }
    }
}

impl SessionSettings {
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// Placeholder pipeline worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerSettings {
    /// PULL bind address for incoming frames.
    pub frames_endpoint: String,
    /// Reply target for single-part frames.
    pub results_endpoint: String,
    pub caption: String,
    pub max_image_bytes: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            frames_endpoint: "tcp://127.0.0.1:5555".to_string(),
            results_endpoint: "tcp://127.0.0.1:5556".to_string(),
            caption: "A caption will appear here.".to_string(),
            max_image_bytes: 8 * 1024 * 1024,
        }
    }
}
