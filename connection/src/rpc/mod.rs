//! Request/response protocol engine.
//!
//! A method call is one request frame written on a fresh stream followed by
//! one or more response chunks read back from it. Methods are plain
//! descriptors ([`RpcMethod`]) so that every protocol shares the same framing,
//! bounds checking and failure handling.
//!
//! # Wire format
//!
//! ```text
//! request  = frame
//! response = *(result_code frame)
//! frame    = uvarint(raw_length) payload
//! ```
//!
//! `raw_length` is the uncompressed payload length. When a compression is in
//! effect the payload is the compressed encoding of the raw bytes.

mod reader;
mod writer;

pub use reader::{read_request, read_response_chunk};
pub use writer::{encode_frame, write_request, write_response_chunk};

use crate::compression::{Compression, CompressionError};
use crate::ssz::{CodecError, Ssz};
use crate::varint::VarintError;
use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Inclusive bounds on the raw length of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBounds {
    pub min: usize,
    pub max: usize,
}

impl SizeBounds {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Bounds for a payload of exactly `len` bytes.
    pub const fn exact(len: usize) -> Self {
        Self { min: len, max: len }
    }

    pub fn contains(&self, len: u64) -> bool {
        len >= self.min as u64 && len <= self.max as u64
    }
}

/// Bounds of the error message carried by a non-success response chunk.
pub const ERROR_MESSAGE_BOUNDS: SizeBounds = SizeBounds::new(0, 256);

/// Result code prefixing every response chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success = 0,
    InvalidRequest = 1,
    ServerError = 2,
}

impl TryFrom<u8> for ResultCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(ResultCode::Success),
            1 => Ok(ResultCode::InvalidRequest),
            2 => Ok(ResultCode::ServerError),
            other => Err(other),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => write!(f, "success"),
            ResultCode::InvalidRequest => write!(f, "invalid request"),
            ResultCode::ServerError => write!(f, "server error"),
        }
    }
}

/// Ways a remote peer can break the framing rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Declared raw length falls outside the method's bounds.
    LengthOutOfBounds { len: u64, min: usize, max: usize },
    /// Compressed body is longer than the compressor allows for the declared length.
    EncodedLengthExceeded { limit: usize },
    /// Result code byte is not a known code.
    UnknownResultCode(u8),
    /// Length prefix does not fit in a `u64`.
    VarintOverflow,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::LengthOutOfBounds { len, min, max } => {
                write!(f, "declared length {len} outside of [{min}, {max}]")
            }
            Violation::EncodedLengthExceeded { limit } => {
                write!(f, "encoded payload exceeds {limit} bytes")
            }
            Violation::UnknownResultCode(code) => write!(f, "unknown result code {code}"),
            Violation::VarintOverflow => write!(f, "length prefix overflows"),
        }
    }
}

/// Errors that can occur during a method call.
///
/// None of these are fatal to the caller, they only end the current call.
#[derive(Debug)]
pub enum RpcError {
    /// The call did not complete within its deadline.
    Timeout,
    /// The stream was closed by the remote before the call completed.
    TransportClosed,
    /// The remote broke the framing rules.
    ProtocolViolation(Violation),
    /// The remote answered with a non-success result code.
    ErrorResponse { code: ResultCode, message: String },
    /// A payload could not be decoded.
    Codec(CodecError),
    /// A payload could not be compressed or decompressed.
    Compression(CompressionError),
    /// Other I/O failure on the stream.
    Io(io::Error),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Timeout => write!(f, "request timed out"),
            RpcError::TransportClosed => write!(f, "stream closed by remote"),
            RpcError::ProtocolViolation(v) => write!(f, "protocol violation: {v}"),
            RpcError::ErrorResponse { code, message } => {
                write!(f, "remote returned {code}: {message}")
            }
            RpcError::Codec(e) => write!(f, "codec error: {e}"),
            RpcError::Compression(e) => write!(f, "compression error: {e}"),
            RpcError::Io(e) => write!(f, "stream error: {e}"),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpcError::Codec(e) => Some(e),
            RpcError::Compression(e) => Some(e),
            RpcError::Io(e) => Some(e),
            RpcError::Timeout
            | RpcError::TransportClosed
            | RpcError::ProtocolViolation(_)
            | RpcError::ErrorResponse { .. } => None,
        }
    }
}

impl From<io::Error> for RpcError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => RpcError::TransportClosed,
            io::ErrorKind::TimedOut => RpcError::Timeout,
            _ => RpcError::Io(err),
        }
    }
}

impl From<VarintError> for RpcError {
    fn from(err: VarintError) -> Self {
        match err {
            VarintError::Io(e) => e.into(),
            VarintError::Closed | VarintError::Truncated => RpcError::TransportClosed,
            VarintError::Overflow => RpcError::ProtocolViolation(Violation::VarintOverflow),
        }
    }
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        RpcError::Codec(err)
    }
}

impl From<CompressionError> for RpcError {
    fn from(err: CompressionError) -> Self {
        RpcError::Compression(err)
    }
}

/// Descriptor of a request/response method.
pub struct RpcMethod<Req, Resp> {
    /// Protocol identifier negotiated for the stream.
    pub protocol: &'static str,
    pub request_bounds: SizeBounds,
    pub response_bounds: SizeBounds,
    /// Maximum number of response chunks.
    pub response_chunks: usize,
    /// Compression applied to every payload, `None` sends them raw.
    pub compression: Option<&'static dyn Compression>,
    types: PhantomData<fn(&Req) -> Resp>,
}

impl<Req, Resp> fmt::Debug for RpcMethod<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcMethod")
            .field("protocol", &self.protocol)
            .field("request_bounds", &self.request_bounds)
            .field("response_bounds", &self.response_bounds)
            .field("response_chunks", &self.response_chunks)
            .field("compression", &self.compression)
            .finish()
    }
}

impl<Req: Ssz, Resp: Ssz> RpcMethod<Req, Resp> {
    /// Method whose request and response are both fixed-size types.
    pub const fn fixed(protocol: &'static str, response_chunks: usize) -> Self {
        Self {
            protocol,
            request_bounds: SizeBounds::exact(Req::SSZ_LEN),
            response_bounds: SizeBounds::exact(Resp::SSZ_LEN),
            response_chunks,
            compression: None,
            types: PhantomData,
        }
    }

    /// Same method with every payload compressed by `compression`.
    pub const fn with_compression(self, compression: &'static dyn Compression) -> Self {
        Self {
            compression: Some(compression),
            ..self
        }
    }

    /// Perform one call over `stream`.
    ///
    /// Writes the request, closes the write side, then reads up to
    /// `response_chunks` chunks. A clean close after at least one chunk ends
    /// the response early.
    ///
    /// # Arguments
    ///
    /// * `stream` - A freshly opened stream negotiated for [`RpcMethod::protocol`].
    /// * `request` - The request message.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Resp>)` - The decoded response chunks.
    /// * `Err(RpcError)` - If the call failed at any point.
    pub async fn request<S>(
        &self,
        stream: &mut S,
        request: &Req,
    ) -> Result<Vec<Resp>, RpcError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let compression = self.compression;
        write_request(stream, self.request_bounds, &request.to_ssz(), compression).await?;

        let mut responses = Vec::with_capacity(self.response_chunks);
        for index in 0..self.response_chunks {
            match read_response_chunk(stream, self.response_bounds, compression).await {
                Ok(payload) => responses.push(Resp::from_ssz(&payload)?),
                Err(RpcError::TransportClosed) if index > 0 => break,
                Err(e) => return Err(e),
            }
        }
        Ok(responses)
    }

    /// Perform one call, failing with [`RpcError::Timeout`] once `deadline` elapses.
    pub async fn request_with_timeout<S>(
        &self,
        stream: &mut S,
        request: &Req,
        deadline: Duration,
    ) -> Result<Vec<Resp>, RpcError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tokio::time::timeout(deadline, self.request(stream, request))
            .await
            .map_err(|_| RpcError::Timeout)?
    }
}
