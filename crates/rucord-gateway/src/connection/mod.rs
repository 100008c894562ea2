//! Connection management
//!
//! State of one WebSocket connection and of the session that can outlive it.

mod backoff;
mod connection;
mod sequence;
mod session;
mod state;

pub use backoff::Backoff;
pub use connection::Connection;
pub use sequence::SequenceCell;
pub use session::Session;
pub use state::ConnectionState;

pub(crate) use connection::zombie_signal;
