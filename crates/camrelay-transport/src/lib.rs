//! Messaging endpoint pairs.
//!
//! Every session owns one outbound channel (frames toward the pipeline) and
//! one inbound channel (results back). [`MessagingContext`] hands out fresh
//! pairs; [`ZmqContext`] speaks ZeroMQ PUSH/PULL and [`InProcContext`] keeps
//! everything inside the process for tests and embedding.

#![deny(unsafe_code)]

pub mod config;
pub mod envelope;
pub mod inproc;
pub mod lease;
pub mod traits;
pub mod zmq;

pub use config::{EndpointConfig, InboundBinding};
pub use envelope::EnvelopeError;
pub use inproc::{InProcContext, PipelineFrame, PipelineHandle};
pub use lease::{ChannelLease, ChannelTracker};
pub use traits::{EndpointPair, FrameSink, MessagingContext, ResultSource};
pub use zmq::{ZmqContext, ZmqInbound, ZmqOutbound};
