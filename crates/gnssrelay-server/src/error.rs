//! Stream and server error types.

use std::io;

use gnssrelay_core::CoreError;
use gnssrelay_ntrip::NtripError;
use gnssrelay_protocol::ProtocolError;
use thiserror::Error;

/// Result type for streaming and serving operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors raised by the dispatcher, its sources, sinks and feeders, and the
/// broadcast server.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Invalid settings, detected before any I/O.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A frame could not be decoded.
    #[error("decode error at byte offset {offset}: {reason}")]
    Decode { offset: u64, reason: String },

    /// Reading from or writing to the primary source failed.
    #[error("source I/O error: {0}")]
    SourceIo(#[source] io::Error),

    /// An output sink failed.
    #[error("sink '{sink}' failed: {source}")]
    SinkIo {
        sink: String,
        #[source]
        source: io::Error,
    },

    /// An auxiliary input failed.
    #[error("auxiliary input '{input}' failed: {message}")]
    AuxIo { input: String, message: String },

    /// NTRIP handshake or framing error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// NTRIP client failure.
    #[error("NTRIP error: {0}")]
    Ntrip(#[from] NtripError),

    /// Listening socket could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Certificate or key could not be loaded.
    #[error("TLS error: {message}")]
    Tls { message: String },
}

impl StreamError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn decode(offset: u64, reason: impl Into<String>) -> Self {
        Self::Decode {
            offset,
            reason: reason.into(),
        }
    }

    pub fn sink_io(sink: impl Into<String>, source: io::Error) -> Self {
        Self::SinkIo {
            sink: sink.into(),
            source,
        }
    }

    pub fn aux_io(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuxIo {
            input: input.into(),
            message: message.into(),
        }
    }

    pub fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }

    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }

    /// Sink and auxiliary failures only cost the failing resource.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SinkIo { .. } | Self::AuxIo { .. })
    }
}

impl From<CoreError> for StreamError {
    fn from(err: CoreError) -> Self {
        Self::config(err.to_string())
    }
}
