//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while parsing or producing NTRIP messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Header block exceeds the maximum accepted size.
    #[error("header too large: more than {max} bytes without terminator")]
    HeaderTooLarge { max: usize },

    /// Response status line could not be parsed.
    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),

    /// Client request could not be parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Chunked transfer encoding violated.
    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    /// Authorization header is not valid Basic credentials.
    #[error("invalid authorization header: {0}")]
    InvalidAuthorization(String),

    /// Caster answered with a status other than 200.
    #[error("caster responded {code} {reason}")]
    UnexpectedStatus { code: u16, reason: String },

    /// Response body is neither a sourcetable nor a data stream.
    #[error("unrecognized response body: {0}")]
    UnrecognizedBody(String),

    /// Header block is not valid UTF-8.
    #[error("header is not valid UTF-8")]
    InvalidEncoding,
}
