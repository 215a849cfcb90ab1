use std::time::Duration;

use camrelay_settings::RelaySettings;
use serde::{Deserialize, Serialize};

use crate::session::coordinator::SessionOptions;

/// Listener and per-session configuration for the relay server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    /// 0 picks a free port.
    pub port: u16,
    pub max_frame_bytes: usize,
    pub static_dir: Option<String>,
    pub cancel_grace: Duration,
    pub idle_timeout: Option<Duration>,
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&RelaySettings::default())
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_frame_bytes: settings.server.max_frame_bytes,
            static_dir: settings.server.static_dir.clone(),
            cancel_grace: settings.session.cancel_grace(),
            idle_timeout: settings.session.idle_timeout(),
            shutdown_grace: settings.server.shutdown_grace(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            cancel_grace: self.cancel_grace,
            idle_timeout: self.idle_timeout,
        }
    }
}
