//! RCON control channel.
//!
//! Implements the Source RCON protocol the server exposes on its control
//! port: an authenticated session with fire-and-forget command dispatch,
//! asynchronous correlated responses, and synchronous request/response.

mod correlation;
mod error;
mod packet;
mod session;

pub use correlation::{CorrelationTable, Pending, RequestKind};
pub use error::RconError;
pub use packet::{Packet, AUTH_FAILED_ID, TYPE_AUTH, TYPE_AUTH_RESPONSE, TYPE_COMMAND, TYPE_RESPONSE};
pub use session::{RconSession, SessionState, TaggedResponse, RESPONSE_TIMEOUT};
