//! Error types for core configuration parsing.

use thiserror::Error;

/// Errors raised while building filters and formatters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identity filter entry could not be parsed.
    #[error("invalid message filter entry '{entry}': {reason}")]
    InvalidFilter { entry: String, reason: String },

    /// A format bitmask contains unknown bits.
    #[error("invalid output format {0}: valid bits are 1, 2, 4, 8, 16 and 32")]
    InvalidFormat(u32),

    /// A protocol bitmask contains unknown bits.
    #[error("invalid protocol filter {0}: valid bits are 1, 2, 4, 8 and 16")]
    InvalidProtocolMask(u32),
}

impl CoreError {
    pub fn invalid_filter(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
