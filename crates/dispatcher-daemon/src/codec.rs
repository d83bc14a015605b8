use std::io;

use dispatcher::Envelope;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const FRAME_HEADER_LEN: usize = 4;
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Messages exchanged over a gateway tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "c")]
pub enum TunnelFrame {
    Hello { gateway_id: String },
    Request(Envelope),
    Keepalive,
}

/// Length-prefixed MessagePack frame: `u32` big-endian body length, then body.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, io::Error> {
    let body = rmp_serde::to_vec_named(value).map_err(io::Error::other)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "frame exceeds maximum length",
        ));
    }
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, io::Error> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "frame header truncated",
        ));
    }
    let mut header = [0u8; FRAME_HEADER_LEN];
    header.copy_from_slice(&bytes[..FRAME_HEADER_LEN]);
    let len = u32::from_be_bytes(header) as usize;
    let body = &bytes[FRAME_HEADER_LEN..];
    if body.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length mismatch: header {} body {}", len, body.len()),
        ));
    }
    rmp_serde::from_slice(body).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, io::Error>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds maximum length", len),
        ));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    rmp_serde::from_slice(&body).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), io::Error>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(value)?;
    writer.write_all(&frame).await?;
    writer.flush().await
}
