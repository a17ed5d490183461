//! Network layer: the socket connection and the correlation-routing
//! session above it.

pub mod connection;
pub mod session;

pub use connection::{CloseReason, Connection, ConnectionError, ConnectionEvent};
pub use session::{NetworkSession, SessionSignal, SessionState};
