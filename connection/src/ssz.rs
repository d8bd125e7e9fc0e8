//! Fixed-size SSZ serialization.
//!
//! Only fixed-size containers are needed by the crawler (status records and
//! node record entries), so the codec is a flat concatenation of fields in
//! declaration order with little-endian integers. A decode fails unless the
//! input is exactly [`Ssz::SSZ_LEN`] bytes.

use std::fmt;

/// Errors that can occur while decoding an SSZ payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Byte length does not match the expected length of the type.
    MalformedPayload {
        /// Length required by the type.
        expected: usize,
        /// Length of the input.
        actual: usize,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::MalformedPayload { expected, actual } => {
                write!(f, "malformed payload: expected {expected} bytes, got {actual}")
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Cursor over an input whose total length has already been validated.
#[derive(Debug)]
pub struct SszReader<'a> {
    bytes: &'a [u8],
}

impl<'a> SszReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Take the next `N` bytes.
    pub fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        if self.bytes.len() < N {
            return Err(CodecError::MalformedPayload {
                expected: N,
                actual: self.bytes.len(),
            });
        }
        let (head, rest) = self.bytes.split_at(N);
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        self.bytes = rest;
        Ok(out)
    }
}

/// A type with a fixed-size SSZ encoding.
pub trait Ssz: Sized {
    /// Exact encoded length in bytes.
    const SSZ_LEN: usize;

    /// Append the encoding of `self` to `buf`.
    fn ssz_write(&self, buf: &mut Vec<u8>);

    /// Read a value from `reader`.
    fn ssz_read(reader: &mut SszReader<'_>) -> Result<Self, CodecError>;

    /// Encode `self` into a new buffer.
    fn to_ssz(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SSZ_LEN);
        self.ssz_write(&mut buf);
        buf
    }

    /// Decode a value, rejecting input of the wrong length.
    fn from_ssz(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Self::SSZ_LEN {
            return Err(CodecError::MalformedPayload {
                expected: Self::SSZ_LEN,
                actual: bytes.len(),
            });
        }
        Self::ssz_read(&mut SszReader::new(bytes))
    }
}

impl Ssz for u64 {
    const SSZ_LEN: usize = 8;

    fn ssz_write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn ssz_read(reader: &mut SszReader<'_>) -> Result<Self, CodecError> {
        Ok(u64::from_le_bytes(reader.take::<8>()?))
    }
}

impl<const N: usize> Ssz for [u8; N] {
    const SSZ_LEN: usize = N;

    fn ssz_write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }

    fn ssz_read(reader: &mut SszReader<'_>) -> Result<Self, CodecError> {
        reader.take::<N>()
    }
}
