//! The `gnssrelay` command line: `stream`, `serve` and `ntrip`.

pub mod callbacks;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use error::{CliError, CliResult};
