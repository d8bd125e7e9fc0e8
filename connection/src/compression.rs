//! Pluggable payload compression.
//!
//! A [`Compression`] compresses whole payloads on the write side. On the read
//! side the payload arrives on a stream with no explicit encoded length, so
//! decompression goes through a [`Decompressor`] that tells the reader how many
//! encoded bytes it wants next. That keeps the stream reader in charge of
//! allocation limits while the compressor only interprets bytes.
//!
//! [`Snappy`] implements the snappy framing format required by `ssz_snappy`
//! protocol identifiers.

use std::fmt;
use std::io::{self, Read, Write};

/// Errors raised by a compressor.
#[derive(Debug)]
pub enum CompressionError {
    /// The payload could not be compressed.
    Compress(io::Error),
    /// Encoded bytes are not a valid stream for this compressor.
    InvalidEncoding(String),
}

impl fmt::Display for CompressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionError::Compress(e) => write!(f, "compression failed: {e}"),
            CompressionError::InvalidEncoding(reason) => write!(f, "invalid encoding: {reason}"),
        }
    }
}

impl std::error::Error for CompressionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompressionError::Compress(e) => Some(e),
            CompressionError::InvalidEncoding(_) => None,
        }
    }
}

/// A compression scheme applied to frame payloads.
pub trait Compression: fmt::Debug + Send + Sync {
    /// Upper bound on the encoded size of a `raw_len` byte payload.
    ///
    /// Returns `None` if the bound does not fit in a `usize`.
    fn max_encoded_len(&self, raw_len: usize) -> Option<usize>;

    /// Compress a whole payload.
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, CompressionError>;

    /// Create a decoder for a payload of `raw_len` uncompressed bytes.
    fn decompressor(&self, raw_len: usize) -> Box<dyn Decompressor + Send>;
}

/// Incremental decoder fed from a stream.
pub trait Decompressor {
    /// Number of encoded bytes required next, or `None` once the payload is complete.
    fn wants(&self) -> Option<usize>;

    /// Feed exactly the number of bytes last reported by [`Decompressor::wants`].
    fn feed(&mut self, bytes: &[u8]) -> Result<(), CompressionError>;

    /// Produce the decompressed payload.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, CompressionError>;
}

/// Largest uncompressed size of a single snappy frame chunk.
const MAX_CHUNK_LEN: usize = 1 << 16;
/// Chunk header: one type byte and a 24 bit little-endian length.
const CHUNK_HEADER_LEN: usize = 4;
/// Masked CRC-32C prefix on data chunks.
const CHUNK_CRC_LEN: usize = 4;
const STREAM_IDENTIFIER: &[u8] = b"sNaPpY";

const CHUNK_COMPRESSED: u8 = 0x00;
const CHUNK_UNCOMPRESSED: u8 = 0x01;
const CHUNK_STREAM_IDENTIFIER: u8 = 0xff;

/// Snappy framing format compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct Snappy;

impl Compression for Snappy {
    fn max_encoded_len(&self, raw_len: usize) -> Option<usize> {
        // Stream identifier, then per chunk a header, a CRC and the
        // worst-case block expansion of 32 + n + n/6.
        let chunks = raw_len.div_ceil(MAX_CHUNK_LEN).max(1);
        let per_chunk = CHUNK_HEADER_LEN + CHUNK_CRC_LEN + 32;
        chunks
            .checked_mul(per_chunk)?
            .checked_add(CHUNK_HEADER_LEN + STREAM_IDENTIFIER.len())?
            .checked_add(raw_len)?
            .checked_add(raw_len / 6)
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut encoder = snap::write::FrameEncoder::new(Vec::new());
        encoder
            .write_all(raw)
            .map_err(CompressionError::Compress)?;
        encoder.into_inner().map_err(|e| {
            CompressionError::Compress(io::Error::new(e.error().kind(), e.error().to_string()))
        })
    }

    fn decompressor(&self, raw_len: usize) -> Box<dyn Decompressor + Send> {
        Box::new(SnappyFrameDecompressor::new(raw_len))
    }
}

/// Progress through the snappy frames of one payload.
#[derive(Debug, Clone, Copy)]
enum FrameState {
    /// Waiting on the 4 byte chunk header.
    Header,
    /// Waiting on a chunk body of `len` bytes.
    Body { kind: u8, len: usize },
}

/// Collects snappy frames until they cover the declared payload length.
///
/// Chunk boundaries are tracked here; checksums and block decoding are
/// left to `snap`'s frame decoder once the frames are complete.
#[derive(Debug)]
struct SnappyFrameDecompressor {
    raw_len: usize,
    state: FrameState,
    framed: Vec<u8>,
    decoded_len: usize,
}

impl SnappyFrameDecompressor {
    fn new(raw_len: usize) -> Self {
        Self {
            raw_len,
            state: FrameState::Header,
            framed: Vec::new(),
            decoded_len: 0,
        }
    }

    fn read_header(&mut self, header: &[u8]) -> Result<(), CompressionError> {
        if header.len() != CHUNK_HEADER_LEN {
            return Err(CompressionError::InvalidEncoding(
                "short chunk header".to_string(),
            ));
        }
        let kind = header[0];
        let len = usize::from(header[1]) | usize::from(header[2]) << 8 | usize::from(header[3]) << 16;
        if (0x02..=0x7f).contains(&kind) {
            return Err(CompressionError::InvalidEncoding(format!(
                "reserved unskippable chunk type {kind:#04x}"
            )));
        }
        if self.framed.is_empty() && kind != CHUNK_STREAM_IDENTIFIER {
            return Err(CompressionError::InvalidEncoding(
                "missing stream identifier".to_string(),
            ));
        }
        self.framed.extend_from_slice(header);
        self.state = FrameState::Body { kind, len };
        Ok(())
    }

    fn read_body(&mut self, kind: u8, body: &[u8]) -> Result<(), CompressionError> {
        let chunk_len = match kind {
            CHUNK_STREAM_IDENTIFIER => {
                if body != STREAM_IDENTIFIER {
                    return Err(CompressionError::InvalidEncoding(
                        "bad stream identifier".to_string(),
                    ));
                }
                0
            }
            CHUNK_COMPRESSED => {
                let block = body.get(CHUNK_CRC_LEN..).ok_or_else(|| {
                    CompressionError::InvalidEncoding("compressed chunk too short".to_string())
                })?;
                snap::raw::decompress_len(block)
                    .map_err(|e| CompressionError::InvalidEncoding(e.to_string()))?
            }
            CHUNK_UNCOMPRESSED => body.len().checked_sub(CHUNK_CRC_LEN).ok_or_else(|| {
                CompressionError::InvalidEncoding("uncompressed chunk too short".to_string())
            })?,
            // Padding and skippable chunks.
            _ => 0,
        };
        if chunk_len > MAX_CHUNK_LEN {
            return Err(CompressionError::InvalidEncoding(format!(
                "chunk of {chunk_len} bytes exceeds {MAX_CHUNK_LEN}"
            )));
        }
        self.decoded_len += chunk_len;
        if self.decoded_len > self.raw_len {
            return Err(CompressionError::InvalidEncoding(format!(
                "payload exceeds declared length {}",
                self.raw_len
            )));
        }
        self.framed.extend_from_slice(body);
        self.state = FrameState::Header;
        Ok(())
    }
}

impl Decompressor for SnappyFrameDecompressor {
    fn wants(&self) -> Option<usize> {
        match self.state {
            FrameState::Header if self.decoded_len >= self.raw_len => None,
            FrameState::Header => Some(CHUNK_HEADER_LEN),
            FrameState::Body { len, .. } => Some(len),
        }
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<(), CompressionError> {
        match self.state {
            FrameState::Header => self.read_header(bytes),
            FrameState::Body { kind, len } => {
                if bytes.len() != len {
                    return Err(CompressionError::InvalidEncoding(
                        "short chunk body".to_string(),
                    ));
                }
                self.read_body(kind, bytes)
            }
        }
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, CompressionError> {
        let mut raw = Vec::with_capacity(self.raw_len);
        snap::read::FrameDecoder::new(&self.framed[..])
            .read_to_end(&mut raw)
            .map_err(|e| CompressionError::InvalidEncoding(e.to_string()))?;
        if raw.len() != self.raw_len {
            return Err(CompressionError::InvalidEncoding(format!(
                "decoded {} bytes, expected {}",
                raw.len(),
                self.raw_len
            )));
        }
        Ok(raw)
    }
}
