//! CLI error type and exit codes.

use std::path::PathBuf;
use std::process::ExitCode;

use gnssrelay_core::{CoreError, TracingError};
use gnssrelay_ntrip::{NtripError, NtripErrorCode};
use gnssrelay_server::StreamError;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Ntrip(#[from] NtripError),

    #[error("logging setup failed: {0}")]
    Tracing(#[from] TracingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        Self::Config(err.to_string())
    }
}

impl CliError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// `2` for NTRIP session failures, `1` for everything else, including
    /// invalid NTRIP settings.
    pub fn exit_status(&self) -> u8 {
        match self {
            Self::Ntrip(e) | Self::Stream(StreamError::Ntrip(e))
                if e.code() != NtripErrorCode::Configuration =>
            {
                2
            }
            _ => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntrip_failures_exit_with_two() {
        let err = CliError::from(NtripError::status(401, "Unauthorized"));
        assert_eq!(err.exit_status(), 2);

        let err = CliError::from(StreamError::config("no source"));
        assert_eq!(err.exit_status(), 1);

        let err = CliError::from(NtripError::configuration("caster host is required"));
        assert_eq!(err.exit_status(), 1);
    }
}
