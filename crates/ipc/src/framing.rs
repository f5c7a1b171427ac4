//! Length-prefixed framing: a little-endian `u32` byte count, then the payload.

use anyhow::{Result, bail};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_MESSAGE_BYTES: usize = 256 * 1024;
const PREFIX_LEN: usize = 4;

pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() || payload.len() > MAX_MESSAGE_BYTES {
        bail!("invalid frame size {}", payload.len());
    }
    let len = u32::try_from(payload.len())?;
    let mut out = Vec::with_capacity(PREFIX_LEN + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Split one frame off the front of `buf`, returning `(payload, remainder)`.
pub fn decode_frame(buf: &[u8]) -> Result<(&[u8], &[u8])> {
    if buf.len() < PREFIX_LEN {
        bail!("frame shorter than length prefix");
    }
    let (prefix, rest) = buf.split_at(PREFIX_LEN);
    let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if len == 0 || len > MAX_MESSAGE_BYTES {
        bail!("invalid frame size {len}");
    }
    if rest.len() < len {
        bail!("frame truncated: want {len} bytes, have {}", rest.len());
    }
    Ok(rest.split_at(len))
}

/// Read one frame. `Ok(None)` means the peer closed the stream cleanly.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(prefix) as usize;
    if len == 0 || len > MAX_MESSAGE_BYTES {
        bail!("invalid frame size {len}");
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let framed = encode_frame(payload)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}
