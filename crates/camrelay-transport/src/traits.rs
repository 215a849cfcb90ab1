use async_trait::async_trait;
use bytes::Bytes;
use camrelay_core::{SessionId, TransportError};

/// Outbound half of an endpoint pair. Written only by the uplink.
#[async_trait]
pub trait FrameSink: Send + Sized + 'static {
    /// Send one frame unmodified. Suspends under back-pressure.
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Release the channel.
    async fn close(self) -> Result<(), TransportError>;
}

/// Inbound half of an endpoint pair. Read only by the downlink.
#[async_trait]
pub trait ResultSource: Send + Sized + 'static {
    /// Wait for the next result. No timeout: silence is not an error.
    async fn recv_result(&mut self) -> Result<Bytes, TransportError>;

    /// Release the channel and its listening address.
    async fn close(self) -> Result<(), TransportError>;
}

/// Process-wide factory for endpoint pairs.
#[async_trait]
pub trait MessagingContext: Send + Sync + 'static {
    type Outbound: FrameSink;
    type Inbound: ResultSource;

    /// Bind a fresh inbound channel and connect a fresh outbound channel
    /// for `session`. On error nothing stays open.
    async fn open_pair(
        &self,
        session: &SessionId,
    ) -> Result<EndpointPair<Self::Outbound, Self::Inbound>, TransportError>;

    /// Channel handles currently alive (two per open pair).
    fn open_channels(&self) -> usize;

    /// Refuse new pairs from now on. Existing pairs are unaffected.
    fn terminate(&self);

    fn is_terminated(&self) -> bool;
}

/// One session's `(outbound, inbound)` channels.
#[derive(Debug)]
pub struct EndpointPair<O, I> {
    pub outbound: O,
    pub inbound: I,
    /// Address announced to the pipeline as `reply_to`, if any.
    pub reply_to: Option<String>,
}
