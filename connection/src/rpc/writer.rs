//! Frame writing.

use super::{ResultCode, RpcError, SizeBounds, Violation};
use crate::compression::{Compression, CompressionError};
use crate::varint;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Encode `payload` as a frame: uncompressed length prefix, then the
/// (optionally compressed) payload.
pub fn encode_frame(
    payload: &[u8],
    compression: Option<&dyn Compression>,
) -> Result<Vec<u8>, CompressionError> {
    let mut frame = Vec::with_capacity(varint::MAX_VARINT_LEN + payload.len());
    varint::encode(payload.len() as u64, &mut frame);
    match compression {
        Some(compression) => frame.extend(compression.compress(payload)?),
        None => frame.extend_from_slice(payload),
    }
    Ok(frame)
}

fn check_bounds(payload: &[u8], bounds: SizeBounds) -> Result<(), RpcError> {
    let len = payload.len() as u64;
    if bounds.contains(len) {
        Ok(())
    } else {
        Err(RpcError::ProtocolViolation(Violation::LengthOutOfBounds {
            len,
            min: bounds.min,
            max: bounds.max,
        }))
    }
}

/// Write a request frame and close the write side of the stream.
pub async fn write_request<W>(
    writer: &mut W,
    bounds: SizeBounds,
    payload: &[u8],
    compression: Option<&dyn Compression>,
) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    check_bounds(payload, bounds)?;
    let frame = encode_frame(payload, compression)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

/// Write one response chunk.
///
/// The caller closes the stream once every chunk has been written.
pub async fn write_response_chunk<W>(
    writer: &mut W,
    code: ResultCode,
    bounds: SizeBounds,
    payload: &[u8],
    compression: Option<&dyn Compression>,
) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    check_bounds(payload, bounds)?;
    let mut chunk = vec![code as u8];
    chunk.extend(encode_frame(payload, compression)?);
    writer.write_all(&chunk).await?;
    writer.flush().await?;
    Ok(())
}
