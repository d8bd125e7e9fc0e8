//! Frame reading.
//!
//! The declared length is validated before a single payload byte is read, and
//! a compressed payload is never read past what the compressor allows for
//! that length. A misbehaving peer therefore cannot make the reader allocate
//! or consume more than the method's bounds permit.

use super::{ResultCode, RpcError, SizeBounds, Violation, ERROR_MESSAGE_BOUNDS};
use crate::compression::Compression;
use crate::varint;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read one frame, returning the raw (decompressed) payload.
async fn read_frame<R>(
    reader: &mut R,
    bounds: SizeBounds,
    compression: Option<&dyn Compression>,
) -> Result<Vec<u8>, RpcError>
where
    R: AsyncRead + Unpin,
{
    let declared = varint::read(reader).await?;
    if !bounds.contains(declared) {
        return Err(RpcError::ProtocolViolation(Violation::LengthOutOfBounds {
            len: declared,
            min: bounds.min,
            max: bounds.max,
        }));
    }
    // Within bounds, so it fits in a usize.
    let raw_len = declared as usize;

    let Some(compression) = compression else {
        let mut payload = vec![0u8; raw_len];
        reader.read_exact(&mut payload).await?;
        return Ok(payload);
    };

    let limit = compression
        .max_encoded_len(raw_len)
        .ok_or(RpcError::ProtocolViolation(Violation::LengthOutOfBounds {
            len: declared,
            min: bounds.min,
            max: bounds.max,
        }))?;
    let mut decompressor = compression.decompressor(raw_len);
    let mut consumed = 0usize;
    let mut buf = Vec::new();
    while let Some(wanted) = decompressor.wants() {
        consumed = consumed.saturating_add(wanted);
        if consumed > limit {
            return Err(RpcError::ProtocolViolation(
                Violation::EncodedLengthExceeded { limit },
            ));
        }
        buf.resize(wanted, 0);
        reader.read_exact(&mut buf).await?;
        decompressor.feed(&buf)?;
    }
    Ok(decompressor.finish()?)
}

/// Read a request frame from the requesting side of a stream.
pub async fn read_request<R>(
    reader: &mut R,
    bounds: SizeBounds,
    compression: Option<&dyn Compression>,
) -> Result<Vec<u8>, RpcError>
where
    R: AsyncRead + Unpin,
{
    read_frame(reader, bounds, compression).await
}

/// Read one response chunk.
///
/// # Returns
///
/// * `Ok(Vec<u8>)` - The raw payload of a success chunk.
/// * `Err(RpcError::ErrorResponse)` - If the chunk carries a non-success code,
///   with the remote's error message.
/// * `Err(RpcError::TransportClosed)` - If the stream ends before the result code.
pub async fn read_response_chunk<R>(
    reader: &mut R,
    bounds: SizeBounds,
    compression: Option<&dyn Compression>,
) -> Result<Vec<u8>, RpcError>
where
    R: AsyncRead + Unpin,
{
    let mut code = [0u8; 1];
    if reader.read(&mut code).await? == 0 {
        return Err(RpcError::TransportClosed);
    }
    let code = ResultCode::try_from(code[0])
        .map_err(|byte| RpcError::ProtocolViolation(Violation::UnknownResultCode(byte)))?;

    match code {
        ResultCode::Success => read_frame(reader, bounds, compression).await,
        ResultCode::InvalidRequest | ResultCode::ServerError => {
            let raw = read_frame(reader, ERROR_MESSAGE_BOUNDS, compression).await?;
            let message = String::from_utf8_lossy(&raw).into_owned();
            debug!("Remote answered {code}: {message}");
            Err(RpcError::ErrorResponse { code, message })
        }
    }
}
