use camrelay_transport::EnvelopeError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("empty frame")]
    EmptyFrame,
    #[error("frame is not a supported image")]
    UnsupportedFormat,
    #[error("image of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("malformed frame message: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("failed to bind {endpoint}: {reason}")]
    Bind { endpoint: String, reason: String },
    #[error("failed to deliver result to {endpoint}: {reason}")]
    Reply { endpoint: String, reason: String },
    #[error("receive failed: {0}")]
    Recv(String),
}

impl PipelineError {
    /// Whether the frame itself was at fault, as opposed to the wire.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::EmptyFrame | Self::UnsupportedFormat | Self::TooLarge { .. })
    }
}
