pub mod errors;
pub mod ids;
pub mod outcome;

pub use errors::{RelayError, TransportError};
pub use ids::SessionId;
pub use outcome::{CloseReason, Direction, Outcome, SessionState};
