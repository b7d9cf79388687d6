//! Source RCON wire codec.
//!
//! Packets are length-prefixed little-endian frames:
//!
//! ```text
//! length: i32   size of the remainder (id + type + body + two NULs)
//! id:     i32   correlation id chosen by the client
//! type:   i32   3 = auth, 2 = command (outbound) / auth response (inbound),
//!               0 = response value
//! body:   bytes, NUL terminated, followed by one more NUL pad
//! ```
//!
//! An auth response carrying id `-1` signals a rejected password.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::RconError;

/// Outbound login request.
pub const TYPE_AUTH: i32 = 3;
/// Outbound command dispatch.
pub const TYPE_COMMAND: i32 = 2;
/// Inbound login acknowledgement (same discriminant as command, by protocol).
pub const TYPE_AUTH_RESPONSE: i32 = 2;
/// Inbound command response.
pub const TYPE_RESPONSE: i32 = 0;

/// Correlation id carried by a rejected auth response.
pub const AUTH_FAILED_ID: i32 = -1;

/// Upper bound on an inbound frame, guarding against garbage framing.
const MAX_FRAME_LEN: usize = 4106;
/// Minimum frame: id + type + two NULs.
const MIN_FRAME_LEN: usize = 10;

/// One RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Correlation id.
    pub id: i32,
    /// Packet type discriminant.
    pub ptype: i32,
    /// Payload text.
    pub body: String,
}

impl Packet {
    /// Build a login packet carrying the password.
    #[must_use]
    pub fn auth(id: i32, password: &str) -> Self {
        Self {
            id,
            ptype: TYPE_AUTH,
            body: password.to_string(),
        }
    }

    /// Build a command packet.
    #[must_use]
    pub fn command(id: i32, command: &str) -> Self {
        Self {
            id,
            ptype: TYPE_COMMAND,
            body: command.to_string(),
        }
    }

    /// Encode into wire bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let len = (body.len() + MIN_FRAME_LEN) as i32;

        let mut buf = Vec::with_capacity(body.len() + MIN_FRAME_LEN + 4);
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.ptype.to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    /// Write the packet to a stream.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the write fails.
    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), RconError> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one packet from a stream.
    ///
    /// # Errors
    ///
    /// Returns [`RconError::MalformedPacket`] if the frame length is outside
    /// protocol bounds, or an I/O error if the stream fails mid-frame.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, RconError> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await?;
        let len = i32::from_le_bytes(len_buf);

        let Ok(len) = usize::try_from(len) else {
            return Err(RconError::MalformedPacket(format!(
                "negative frame length {len}"
            )));
        };

        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&len) {
            return Err(RconError::MalformedPacket(format!(
                "frame length {len} outside [{MIN_FRAME_LEN}, {MAX_FRAME_LEN}]"
            )));
        }

        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).await?;

        let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let ptype = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let body = String::from_utf8_lossy(&frame[8..len - 2]).into_owned();

        Ok(Self { id, ptype, body })
    }
}
