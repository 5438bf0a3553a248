//! Error types for NTRIP client operations.

use std::fmt;

use gnssrelay_protocol::ProtocolError;
use thiserror::Error;

/// The category of an NTRIP client error.
///
/// Drives the retry decision: transient categories are retried under the
/// configured policy, everything else ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NtripErrorCode {
    /// TCP connect, DNS resolution or socket I/O failed.
    Connection,
    /// Connect or handshake timed out, or the stream went quiet.
    Timeout,
    /// The stream ended or broke after data had started.
    Interrupted,
    /// Caster rejected the credentials (401).
    Unauthorized,
    /// Caster refused access (403).
    Forbidden,
    /// Mountpoint unknown to the caster (404).
    NotFound,
    /// Caster answered 5xx.
    ServerError,
    /// Any other non-200 status.
    UnexpectedStatus,
    /// Response head or body could not be understood.
    InvalidResponse,
    /// TLS setup or handshake failed.
    Tls,
    /// Missing or invalid client settings.
    Configuration,
    /// Every retry was used up.
    RetriesExhausted,
}

impl NtripErrorCode {
    /// Returns true if the failure is transient and the attempt may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Timeout | Self::Interrupted | Self::ServerError
        )
    }

    /// Map a caster status code onto a category.
    pub fn from_status(code: u16) -> Self {
        match code {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            500..=599 => Self::ServerError,
            _ => Self::UnexpectedStatus,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Interrupted => "interrupted",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::ServerError => "server_error",
            Self::UnexpectedStatus => "unexpected_status",
            Self::InvalidResponse => "invalid_response",
            Self::Tls => "tls",
            Self::Configuration => "configuration",
            Self::RetriesExhausted => "retries_exhausted",
        }
    }
}

impl fmt::Display for NtripErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by the NTRIP client.
#[derive(Debug, Error)]
pub struct NtripError {
    code: NtripErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl NtripError {
    pub fn new(code: NtripErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(NtripErrorCode::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(NtripErrorCode::Timeout, message)
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(NtripErrorCode::Interrupted, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(NtripErrorCode::InvalidResponse, message)
    }

    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(NtripErrorCode::Tls, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(NtripErrorCode::Configuration, message)
    }

    pub fn retries_exhausted(attempts: u32, last: &NtripError) -> Self {
        Self::new(
            NtripErrorCode::RetriesExhausted,
            format!("giving up after {attempts} attempts, last error: {last}"),
        )
    }

    /// Error for a non-200 caster status.
    pub fn status(code: u16, reason: &str) -> Self {
        Self::new(
            NtripErrorCode::from_status(code),
            format!("caster responded {code} {reason}"),
        )
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> NtripErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for NtripError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<ProtocolError> for NtripError {
    fn from(err: ProtocolError) -> Self {
        if let ProtocolError::UnexpectedStatus { code, reason } = &err {
            return Self::status(*code, reason);
        }
        let message = err.to_string();
        if matches!(err, ProtocolError::InvalidChunk(_)) {
            Self::interrupted(message).with_source(err)
        } else {
            Self::invalid_response(message).with_source(err)
        }
    }
}

impl From<std::io::Error> for NtripError {
    fn from(err: std::io::Error) -> Self {
        Self::connection(err.to_string()).with_source(err)
    }
}

/// A specialized Result type for NTRIP client operations.
pub type NtripResult<T> = Result<T, NtripError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_categories() {
        assert_eq!(NtripErrorCode::from_status(401), NtripErrorCode::Unauthorized);
        assert_eq!(NtripErrorCode::from_status(404), NtripErrorCode::NotFound);
        assert_eq!(NtripErrorCode::from_status(503), NtripErrorCode::ServerError);
        assert_eq!(NtripErrorCode::from_status(302), NtripErrorCode::UnexpectedStatus);
    }

    #[test]
    fn only_transient_errors_retry() {
        assert!(NtripError::status(500, "Internal Server Error").is_retryable());
        assert!(NtripError::connection("refused").is_retryable());
        assert!(NtripError::timeout("no data").is_retryable());
        assert!(!NtripError::status(401, "Unauthorized").is_retryable());
        assert!(!NtripError::status(403, "Forbidden").is_retryable());
        assert!(!NtripError::status(404, "Not Found").is_retryable());
        assert!(!NtripError::configuration("no server").is_retryable());
    }

    #[test]
    fn converts_protocol_errors() {
        let err: NtripError = ProtocolError::UnexpectedStatus {
            code: 404,
            reason: "Not Found".into(),
        }
        .into();
        assert_eq!(err.code(), NtripErrorCode::NotFound);
        assert_eq!(err.to_string(), "not_found: caster responded 404 Not Found");

        let err: NtripError = ProtocolError::InvalidChunk("bad".into()).into();
        assert!(err.is_retryable());
    }
}
