//! Length-prefixed framing for agent messages

use crate::agent::message::AgentMessage;
use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (16MB, same as OpenSSH)
const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Reads and writes agent message frames
pub struct AgentCodec;

impl AgentCodec {
    /// Read one frame; `Ok(None)` on clean EOF before a frame starts
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<AgentMessage>> {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf);
        if len == 0 || len > MAX_FRAME_SIZE {
            return Err(Error::InvalidMessage(format!(
                "Invalid frame length: {} bytes",
                len
            )));
        }

        let mut body = vec![0u8; len as usize];
        reader.read_exact(&mut body).await?;
        AgentMessage::decode(&body).map(Some)
    }

    /// Write one frame and flush
    pub async fn write<W: AsyncWrite + Unpin>(writer: &mut W, msg: &AgentMessage) -> Result<()> {
        writer.write_all(&msg.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}
