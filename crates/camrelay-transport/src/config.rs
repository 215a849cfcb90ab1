use std::time::Duration;

use camrelay_settings::{InboundMode, PipelineSettings};

/// Where a session's inbound channel listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundBinding {
    /// Every session binds the same address. A second concurrent session
    /// fails with `BindConflict`.
    Fixed(String),
    /// Each session binds `tcp://<host>:0` and announces the resolved
    /// address as `reply_to`.
    Ephemeral { host: String },
}

impl InboundBinding {
    pub fn announces_reply_to(&self) -> bool {
        matches!(self, Self::Ephemeral { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    /// PUSH target for frames.
    pub pipeline_endpoint: String,
    pub inbound: InboundBinding,
    /// Bound on connecting the outbound channel.
    pub connect_timeout: Duration,
}

impl From<&PipelineSettings> for EndpointConfig {
    fn from(settings: &PipelineSettings) -> Self {
        let inbound = match settings.inbound.mode {
            InboundMode::Fixed => InboundBinding::Fixed(settings.inbound.fixed_endpoint.clone()),
            InboundMode::Ephemeral => InboundBinding::Ephemeral {
                host: settings.inbound.ephemeral_host.clone(),
            },
        };
        Self {
            pipeline_endpoint: settings.frames_endpoint.clone(),
            inbound,
            connect_timeout: settings.connect_timeout(),
        }
    }
}
