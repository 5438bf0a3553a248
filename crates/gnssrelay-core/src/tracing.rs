//! Tracing setup for gnssrelay
//!
//! Provides unified logging configuration for all crates. Log lines go to
//! stderr so that terminal output of streamed messages stays clean, and can
//! additionally be written to a daily-rolling log file.
//!
//! # Usage
//!
//! ```ignore
//! use gnssrelay_core::tracing::{init_tracing, TracingConfig, Verbosity};
//!
//! let _guard = init_tracing(TracingConfig::from_verbosity(Verbosity::from_level(2)))?;
//! ```

use std::path::PathBuf;

use thiserror::Error;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, format::FmtSpan},
    layer::{Layer, Layered},
    prelude::*,
};

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to set global subscriber
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// Failed to parse env filter directive
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),

    /// Log file path has no file name component
    #[error("invalid log file path: {0}")]
    LogFile(PathBuf),
}

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format (default)
    #[default]
    Compact,
    /// JSON format
    Json,
}

/// Numeric verbosity as accepted on the command line.
///
/// `-1` critical, `0` error, `1` warning, `2` info, `3` debug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verbosity(i8);

impl Verbosity {
    pub const DEFAULT: Self = Self(1);

    pub fn from_level(level: i8) -> Self {
        Self(level.clamp(-1, 4))
    }

    /// Tracing has no level above error, so critical maps to error.
    pub fn level(&self) -> Level {
        match self.0 {
            i8::MIN..=0 => Level::ERROR,
            1 => Level::WARN,
            2 => Level::INFO,
            3 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// The default log level when RUST_LOG is not set
    pub default_level: Level,
    /// Output format for log messages
    pub output_format: TracingOutputFormat,
    /// Whether to include file/line information in logs
    pub include_location: bool,
    /// Whether to include target (module path) in logs
    pub include_target: bool,
    /// Whether to include span events (enter/exit)
    pub include_span_events: bool,
    /// Custom env filter directive (overrides default_level if set)
    pub env_filter: Option<String>,
    /// Also write logs to this file, rotated daily
    pub log_file: Option<PathBuf>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::WARN,
            output_format: TracingOutputFormat::Compact,
            include_location: false,
            include_target: true,
            include_span_events: false,
            env_filter: None,
            log_file: None,
        }
    }
}

impl TracingConfig {
    /// Config for the given command line verbosity.
    #[must_use]
    pub fn from_verbosity(verbosity: Verbosity) -> Self {
        let config = Self::default().with_level(verbosity.level());
        if verbosity.level() >= Level::DEBUG {
            Self {
                include_location: true,
                ..config
            }
        } else {
            config
        }
    }

    /// Set the default log level
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Set the output format
    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Set a custom env filter directive
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Also log to a daily-rolling file at `path`
    #[must_use]
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

/// Initialize tracing with the given configuration.
///
/// Call once at process start. `RUST_LOG` overrides the default level.
/// When a log file is configured the returned guard must be kept alive for
/// buffered lines to be flushed.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set, if the
/// env filter directive is invalid, or if the log file path has no file name.
pub fn init_tracing(config: TracingConfig) -> Result<Option<WorkerGuard>, TracingError> {
    let env_filter = if let Some(ref filter) = config.env_filter {
        EnvFilter::try_new(filter)?
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("gnssrelay={}", config.default_level)))
    };

    let span_events = || {
        if config.include_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target)
        .with_span_events(span_events());
    layers.push(match config.output_format {
        TracingOutputFormat::Pretty => console.pretty().boxed(),
        TracingOutputFormat::Compact => console.compact().boxed(),
        TracingOutputFormat::Json => console.json().boxed(),
    });

    let mut guard = None;
    if let Some(path) = &config.log_file {
        let file_name = path
            .file_name()
            .ok_or_else(|| TracingError::LogFile(path.clone()))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(config.include_target)
                .with_span_events(span_events())
                .boxed(),
        );
        guard = Some(file_guard);
    }

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(env_filter).with(layers))?;

    Ok(guard)
}
