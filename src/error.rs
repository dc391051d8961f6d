//! Error types for the HTTP/2 engine.
//!
//! Every failure is classified by severity (RFC 7540 Section 5.4):
//! stream errors reset a single stream with RST_STREAM, connection errors
//! require GOAWAY. Integration errors (invalid settings values, missing
//! decorator capabilities) are reported to the caller and never reach the peer.

use std::fmt;

use thiserror::Error;

/// HTTP/2 error codes (RFC 7540 Section 7)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Map a wire value to a code. Unknown codes are treated as INTERNAL_ERROR.
    pub fn from_u32(code: u32) -> Self {
        match code {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x2 => Self::InternalError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            _ => Self::InternalError,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoError => "NO_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::FlowControlError => "FLOW_CONTROL_ERROR",
            Self::SettingsTimeout => "SETTINGS_TIMEOUT",
            Self::StreamClosed => "STREAM_CLOSED",
            Self::FrameSizeError => "FRAME_SIZE_ERROR",
            Self::RefusedStream => "REFUSED_STREAM",
            Self::Cancel => "CANCEL",
            Self::CompressionError => "COMPRESSION_ERROR",
            Self::ConnectError => "CONNECT_ERROR",
            Self::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            Self::InadequateSecurity => "INADEQUATE_SECURITY",
            Self::Http11Required => "HTTP_1_1_REQUIRED",
        };
        f.write_str(name)
    }
}

/// Malformed HPACK input (RFC 7541). Always fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HpackError {
    #[error("header block truncated")]
    Truncated,
    #[error("prefix integer overflows 32 bits")]
    IntegerOverflow,
    #[error("index {0} is outside the header table")]
    InvalidIndex(usize),
    #[error("invalid Huffman sequence")]
    InvalidHuffman,
    #[error("dynamic table size update after a header representation")]
    SizeUpdateNotFirst,
    #[error("dynamic table size update to {requested} exceeds limit {limit}")]
    SizeUpdateTooLarge { requested: usize, limit: usize },
}

/// Errors raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum H2Error {
    /// Requires GOAWAY and closing the connection.
    #[error("connection error {code}: {message}")]
    Connection { code: ErrorCode, message: String },

    /// Resets one stream; the connection continues.
    #[error("stream {stream_id} error {code}: {message}")]
    Stream {
        stream_id: u32,
        code: ErrorCode,
        message: String,
    },

    /// A header list grew past the negotiated SETTINGS_MAX_HEADER_LIST_SIZE.
    /// Stream scoped: the caller resets or refuses `stream_id` with `code`.
    #[error("header list size {size} exceeds limit {max} on stream {stream_id}")]
    HeaderListSizeExceeded {
        stream_id: u32,
        code: ErrorCode,
        size: usize,
        max: usize,
    },

    /// HPACK decoding failed; the shared table state can no longer be trusted.
    #[error("header compression error: {0}")]
    Compression(#[from] HpackError),

    /// A frame exceeded the negotiated SETTINGS_MAX_FRAME_SIZE.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A settings value outside its allowed range.
    #[error("invalid value {value} for setting 0x{id:x}")]
    InvalidSetting { id: u16, value: i64 },

    /// The integrator wired components together incorrectly.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

pub type H2Result<T> = Result<T, H2Error>;

impl H2Error {
    pub fn connection(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Connection {
            code,
            message: message.into(),
        }
    }

    pub fn stream(stream_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Stream {
            stream_id,
            code,
            message: message.into(),
        }
    }

    /// Connection-level PROTOCOL_ERROR
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::connection(ErrorCode::ProtocolError, message)
    }

    /// Connection-level FRAME_SIZE_ERROR
    pub fn frame_size(message: impl Into<String>) -> Self {
        Self::connection(ErrorCode::FrameSizeError, message)
    }

    /// Whether this error must tear down the connection with GOAWAY.
    pub fn should_goaway(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Compression(_) | Self::FrameTooLarge { .. }
        )
    }

    /// Alias kept for symmetry with [`H2Error::is_stream_error`].
    pub fn is_connection_error(&self) -> bool {
        self.should_goaway()
    }

    pub fn is_stream_error(&self) -> bool {
        matches!(self, Self::Stream { .. } | Self::HeaderListSizeExceeded { .. })
    }

    /// Stream to reset for stream-scoped errors.
    pub fn stream_id(&self) -> Option<u32> {
        match self {
            Self::Stream { stream_id, .. } | Self::HeaderListSizeExceeded { stream_id, .. } => {
                Some(*stream_id)
            }
            _ => None,
        }
    }

    /// Wire code to put in RST_STREAM or GOAWAY. `None` for integration errors.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Connection { code, .. }
            | Self::Stream { code, .. }
            | Self::HeaderListSizeExceeded { code, .. } => Some(*code),
            Self::Compression(_) => Some(ErrorCode::CompressionError),
            Self::FrameTooLarge { .. } => Some(ErrorCode::FrameSizeError),
            Self::InvalidSetting { .. } | Self::UnsupportedOperation(_) => None,
        }
    }
}
