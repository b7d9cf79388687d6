//! RCON error types.

/// Errors that can occur on the RCON control channel.
#[derive(thiserror::Error, Debug)]
pub enum RconError {
    /// The transport could not be established.
    #[error("Connection failed: {0}")]
    Connection(#[source] std::io::Error),

    /// The server rejected the login password.
    #[error("Authentication rejected by server")]
    Auth,

    /// The connection dropped or was reset while a request was pending.
    #[error("Connection lost before response arrived")]
    ConnectionLost,

    /// No response arrived within the response timeout.
    #[error("Timed out waiting for response after {0} ms")]
    Timeout(u64),

    /// A response packet violated the wire framing.
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
