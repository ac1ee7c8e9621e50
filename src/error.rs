//! Error types
//!
//! Errors are grouped by how the pipeline reacts to them:
//!
//! - [`InitError`]: a codec, scaler or transport could not be constructed.
//!   Fatal to the owning transmitter/receiver; surfaced to the caller.
//! - [`CodecError`]: a single submit failed. Logged, the frame is dropped and
//!   the session keeps running.
//! - [`ProtocolError`]: malformed bytes on the wire or in the bitstream.
//!   Logged, the offending buffer is discarded and parsing continues.
//! - [`FrameError`]: the caller handed in a frame the pipeline cannot accept.
//! - [`TransportError`]: the message transport is gone or unusable.
//!
//! Backpressure is deliberately absent: a full queue drops the message and
//! bumps a counter, it never produces an error.

use std::fmt;
use std::io;

use crate::media::frame::{Geometry, PixelFormat};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Construction failed, no retry
    FatalInit,
    /// One frame or unit was lost, the session continues
    TransientCodec,
    /// Malformed wire or bitstream data
    ProtocolDesync,
    /// Caller supplied an unacceptable frame
    InvalidInput,
    /// Transport closed or I/O failure
    Transport,
}

/// Crate error type
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),
    /// Construction failure
    Init(InitError),
    /// Per-frame codec failure
    Codec(CodecError),
    /// Wire or bitstream protocol violation
    Protocol(ProtocolError),
    /// Rejected input frame
    Frame(FrameError),
    /// Transport failure
    Transport(TransportError),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Init(_) => ErrorKind::FatalInit,
            Error::Codec(_) => ErrorKind::TransientCodec,
            Error::Protocol(_) => ErrorKind::ProtocolDesync,
            Error::Frame(_) => ErrorKind::InvalidInput,
            Error::Io(_) | Error::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Whether the owning component must give up
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::FatalInit | ErrorKind::Transport)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Init(e) => write!(f, "Initialization failed: {}", e),
            Error::Codec(e) => write!(f, "Codec error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Frame(e) => write!(f, "Frame rejected: {}", e),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<InitError> for Error {
    fn from(e: InitError) -> Self {
        Error::Init(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Error::Frame(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

/// Construction failures
#[derive(Debug)]
pub enum InitError {
    /// The H.264 encoder could not be created
    Encoder(String),
    /// The H.264 decoder could not be created
    Decoder(String),
    /// No conversion exists between the two pixel layouts
    UnsupportedConversion { from: PixelFormat, to: PixelFormat },
    /// Geometry unusable for 4:2:0 (zero or odd dimension)
    InvalidGeometry(Geometry),
    /// Socket bind failed
    Bind(io::Error),
    /// Runtime for the network transport could not start
    Runtime(io::Error),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Encoder(msg) => write!(f, "could not open encoder: {}", msg),
            InitError::Decoder(msg) => write!(f, "could not open decoder: {}", msg),
            InitError::UnsupportedConversion { from, to } => {
                write!(f, "no color conversion from {:?} to {:?}", from, to)
            }
            InitError::InvalidGeometry(g) => {
                write!(f, "geometry {} is not usable for 4:2:0 video", g)
            }
            InitError::Bind(e) => write!(f, "could not bind socket: {}", e),
            InitError::Runtime(e) => write!(f, "could not start runtime: {}", e),
        }
    }
}

/// Per-frame codec failures
#[derive(Debug, Clone)]
pub enum CodecError {
    /// Encoder rejected the picture
    Encode(String),
    /// Decoder rejected the access unit
    Decode(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(msg) => write!(f, "encode failed: {}", msg),
            CodecError::Decode(msg) => write!(f, "decode failed: {}", msg),
        }
    }
}

/// Wire and bitstream violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Envelope tag is not a known chunk kind
    UnknownTag(u8),
    /// Envelope length field is zero or exceeds the limit
    InvalidLength(usize),
    /// Marker payload has the wrong size
    MalformedMarker(usize),
    /// Terminator carried a payload
    MalformedTerminator(usize),
    /// Parser buffer grew past its bound without an access unit boundary
    ParserOverflow(usize),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownTag(tag) => write!(f, "unknown chunk tag 0x{:02x}", tag),
            ProtocolError::InvalidLength(len) => write!(f, "invalid envelope length {}", len),
            ProtocolError::MalformedMarker(len) => {
                write!(f, "marker payload has {} bytes", len)
            }
            ProtocolError::MalformedTerminator(len) => {
                write!(f, "terminator carries {} bytes", len)
            }
            ProtocolError::ParserOverflow(len) => {
                write!(f, "parser buffer overflow at {} bytes", len)
            }
        }
    }
}

/// Rejected input frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame geometry differs from the geometry captured on the first frame
    GeometryMismatch { expected: Geometry, actual: Geometry },
    /// Frame pixel layout differs from the one the converter was built for
    FormatMismatch { expected: PixelFormat, actual: PixelFormat },
    /// Backing buffer is too small for the declared geometry and strides
    BufferTooSmall { needed: usize, actual: usize },
    /// Stride shorter than one row of pixels
    InvalidStride { plane: usize, stride: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::GeometryMismatch { expected, actual } => {
                write!(f, "expected {} frame, got {}", expected, actual)
            }
            FrameError::FormatMismatch { expected, actual } => {
                write!(f, "expected {:?} frame, got {:?}", expected, actual)
            }
            FrameError::BufferTooSmall { needed, actual } => {
                write!(f, "buffer holds {} bytes, {} needed", actual, needed)
            }
            FrameError::InvalidStride { plane, stride } => {
                write!(f, "stride {} too short for plane {}", stride, plane)
            }
        }
    }
}

/// Transport failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The other end of the transport is gone
    Closed,
    /// Address could not be resolved
    Resolve(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::Resolve(addr) => write!(f, "could not resolve {}", addr),
        }
    }
}
