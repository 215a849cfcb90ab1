//! One relay session per WebSocket client.

pub mod coordinator;
pub mod downlink;
pub mod uplink;

use std::sync::atomic::{AtomicU64, Ordering};

/// Traffic counters shared by a session's two forwarders.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_up: AtomicU64,
    messages_down: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_up(&self) {
        self.frames_up.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_down(&self) {
        self.messages_down.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_up(&self) -> u64 {
        self.frames_up.load(Ordering::Relaxed)
    }

    pub fn messages_down(&self) -> u64 {
        self.messages_down.load(Ordering::Relaxed)
    }
}
