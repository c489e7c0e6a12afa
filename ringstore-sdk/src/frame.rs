//! Length-prefixed framing.
//!
//! Every message on the wire is an 8-byte big-endian unsigned length
//! followed by that many bytes of UTF-8 JSON. One request frame and one
//! response frame per connection.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WireError;

/// Upper bound on a single frame. Overlay dumps grow with ring size and
/// store contents but stay far below this; anything larger is a broken or
/// hostile peer.
pub const MAX_FRAME: u64 = 16 * 1024 * 1024;

/// Read one length-prefixed frame. Returns the raw payload bytes.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 8];
    reader.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::Closed
        } else {
            WireError::Io(e)
        }
    })?;
    let len = u64::from_be_bytes(len_buf);
    if len > MAX_FRAME {
        return Err(WireError::Oversize(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let len = payload.len() as u64;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
