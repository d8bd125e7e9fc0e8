//! Unsigned LEB128 varints.
//!
//! Every length prefix of a request or response frame is an unsigned
//! varint. Reads from a stream
//! happen one byte at a time so that nothing past the prefix is consumed
//! before the caller has validated the declared length.

use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum encoded size of a `u64` varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Errors that can occur while decoding a varint.
#[derive(Debug)]
pub enum VarintError {
    /// I/O error on the underlying reader.
    Io(io::Error),
    /// The stream ended before the first byte of the varint.
    Closed,
    /// The input ended in the middle of a varint.
    Truncated,
    /// The varint does not fit in a `u64`.
    Overflow,
}

impl fmt::Display for VarintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarintError::Io(e) => write!(f, "IO error while reading varint: {e}"),
            VarintError::Closed => write!(f, "stream closed before varint"),
            VarintError::Truncated => write!(f, "varint truncated"),
            VarintError::Overflow => write!(f, "varint overflows u64"),
        }
    }
}

impl std::error::Error for VarintError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VarintError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Append the varint encoding of `value` to `buf`.
pub fn encode(mut value: u64, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Decode a varint from the start of `bytes`.
///
/// # Returns
///
/// * `Ok((value, consumed))` - The decoded value and the number of bytes it occupied.
/// * `Err(VarintError)` - If the input is truncated or overflows.
pub fn decode(bytes: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut value: u64 = 0;
    for (i, &b) in bytes.iter().take(MAX_VARINT_LEN).enumerate() {
        if i == MAX_VARINT_LEN - 1 && b > 1 {
            return Err(VarintError::Overflow);
        }
        value |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if bytes.len() >= MAX_VARINT_LEN {
        Err(VarintError::Overflow)
    } else {
        Err(VarintError::Truncated)
    }
}

/// Read a varint from `reader`, one byte per read call.
///
/// # Errors
///
/// * [`VarintError::Closed`] if the stream is at EOF before the first byte.
/// * [`VarintError::Truncated`] if the stream ends mid-varint.
/// * [`VarintError::Overflow`] if more than [`MAX_VARINT_LEN`] bytes are used.
pub async fn read<R>(reader: &mut R) -> Result<u64, VarintError>
where
    R: AsyncRead + Unpin,
{
    let mut value: u64 = 0;
    let mut byte = [0u8; 1];
    for i in 0..MAX_VARINT_LEN {
        let n = reader.read(&mut byte).await.map_err(VarintError::Io)?;
        if n == 0 {
            return Err(if i == 0 {
                VarintError::Closed
            } else {
                VarintError::Truncated
            });
        }
        let b = byte[0];
        if i == MAX_VARINT_LEN - 1 && b > 1 {
            return Err(VarintError::Overflow);
        }
        value |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(VarintError::Overflow)
}
