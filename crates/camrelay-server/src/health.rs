//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while accepting sessions, `"draining"` once shutdown began.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Sessions between accept and teardown.
    pub active_sessions: usize,
    /// Messaging channel handles currently open (two per session).
    pub open_channels: usize,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    active_sessions: usize,
    open_channels: usize,
    accepting: bool,
) -> HealthResponse {
    HealthResponse {
        status: if accepting { "ok" } else { "draining" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        active_sessions,
        open_channels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok_while_accepting() {
        let resp = health_check(Instant::now(), 0, 0, true);
        assert_eq!(resp.status, "ok");
        assert!(resp.is_ok());
    }

    #[test]
    fn status_is_draining_after_terminate() {
        let resp = health_check(Instant::now(), 1, 2, false);
        assert_eq!(resp.status, "draining");
        assert!(!resp.is_ok());
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, 0, 0, true);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), 3, 6, true);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["active_sessions"], 3);
        assert_eq!(parsed["open_channels"], 6);
        assert!(parsed["uptime_secs"].is_number());
    }
}
