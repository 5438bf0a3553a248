//! gnssrelay CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use gnssrelay_cli::cli::{Cli, Command};
use gnssrelay_cli::commands;
use gnssrelay_cli::config::{
    self, NTRIP_CONF_ENV, NtripSettings, SERVE_CONF_ENV, STREAM_CONF_ENV, ServeSettings,
    StreamSettings,
};
use gnssrelay_cli::error::CliResult;
use gnssrelay_core::{TracingConfig, Verbosity, init_tracing};
use gnssrelay_server::SignalHandler;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbosity = cli.verbosity.map(Verbosity::from_level).unwrap_or_default();
    let mut tracing_config = TracingConfig::from_verbosity(verbosity);
    if let Some(path) = &cli.logtofile {
        tracing_config = tracing_config.with_log_file(path);
    }
    // Held for the process lifetime so buffered file logs are flushed.
    let _log_guard = match init_tracing(tracing_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "gnssrelay failed");
            eprintln!("error: {e}");
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let signals = SignalHandler::new();
    signals.spawn_listener()?;
    let shutdown = signals.shutdown_handle();
    let explicit = cli.config.as_deref();

    match cli.command {
        Command::Stream(args) => {
            let mut settings: StreamSettings = config::load(explicit, STREAM_CONF_ENV, "stream")?;
            settings.merge(&args);
            commands::stream::run(settings, shutdown).await?;
        }
        Command::Serve(args) => {
            let mut settings: ServeSettings = config::load(explicit, SERVE_CONF_ENV, "serve")?;
            settings.merge(&args);
            commands::serve::run(settings, shutdown).await?;
        }
        Command::Ntrip(args) => {
            let mut settings: NtripSettings = config::load(explicit, NTRIP_CONF_ENV, "ntrip")?;
            settings.merge(&args);
            commands::ntrip::run(settings, shutdown).await?;
        }
    }
    info!("Done");
    Ok(())
}
