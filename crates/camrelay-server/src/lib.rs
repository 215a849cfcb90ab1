//! # camrelay-server
//!
//! Accepts WebSocket clients at `/ws` and gives each one a relay session:
//! an uplink forwarding binary frames to the pipeline and a downlink
//! forwarding results back, raced by a coordinator that tears both down as
//! soon as either stops.

#![deny(unsafe_code)]

pub mod acceptor;
pub mod config;
pub mod health;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;

pub use acceptor::Acceptor;
pub use config::ServerConfig;
pub use registry::SessionRegistry;
pub use server::{build_router, start, AppState, ServerHandle};
pub use session::coordinator::{Coordinator, SessionOptions, SessionReport};
