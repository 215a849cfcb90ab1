use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts live channel handles for a context.
#[derive(Clone, Debug, Default)]
pub struct ChannelTracker {
    open: Arc<AtomicUsize>,
}

impl ChannelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one handle; the count drops again when the lease drops.
    pub fn lease(&self) -> ChannelLease {
        self.open.fetch_add(1, Ordering::SeqCst);
        ChannelLease { open: self.open.clone() }
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Held by every channel handle for as long as it lives.
#[derive(Debug)]
pub struct ChannelLease {
    open: Arc<AtomicUsize>,
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
