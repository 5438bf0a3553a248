//! `ntrip`: list a caster's sourcetable or relay one of its correction
//! streams to an output sink.

use std::io::Write;

use gnssrelay_core::{FormatSpec, Formatter, OutputEvent};
use gnssrelay_ntrip::{LivePosition, NtripClient, NtripEvent, SessionOutcome};
use gnssrelay_protocol::{NearestMountpoint, SourceTable};
use gnssrelay_server::{OutputSink, ShutdownHandle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::commands::stream::sink_spec;
use crate::config::NtripSettings;
use crate::error::{CliError, CliResult};

/// What a client run produced.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NtripSummary {
    pub sourcetable: Option<SourceTable>,
    pub corrections: u64,
}

pub async fn run(settings: NtripSettings, shutdown: ShutdownHandle) -> CliResult<NtripSummary> {
    let config = settings.client_config()?;
    let format = FormatSpec::from_value(settings.format)?;
    let sourcetable_only = config.mountpoint.is_empty();

    let mut sink = if sourcetable_only {
        None
    } else {
        Some(sink_spec(&settings.output)?.open(&LivePosition::new()).await?)
    };

    info!(
        caster = %config.address(),
        mountpoint = %config.mountpoint,
        version = %config.version,
        "Connecting to caster"
    );
    let (tx, mut rx) = mpsc::channel(64);
    let client = NtripClient::new(config, tx);
    let stop = shutdown.subscribe();
    let session = tokio::spawn(async move { client.run(stop).await });

    let mut formatter = Formatter::new(format);
    let mut summary = NtripSummary::default();
    if let (Some(sink), Some(preamble)) = (sink.as_mut(), formatter.preamble()) {
        write_event(&mut **sink, &preamble).await?;
    }

    while let Some(event) = rx.recv().await {
        match event {
            NtripEvent::Sourcetable { table, nearest } => {
                print_sourcetable(&table, nearest.as_ref())?;
                summary.sourcetable = Some(table);
            }
            NtripEvent::Correction(message) => {
                summary.corrections += 1;
                let (Some(sink), Some(event)) = (sink.as_mut(), formatter.format(&message)) else {
                    continue;
                };
                if let Err(e) = write_event(&mut **sink, &event).await {
                    warn!(error = %e, "Output failed, stopping client");
                    break;
                }
            }
            NtripEvent::GgaSent(sentence) => debug!(gga = %sentence.trim_end(), "Sent GGA"),
        }
    }
    // Dropping the receiver ends the session if the loop broke early.
    drop(rx);

    let outcome = session
        .await
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;

    if let Some(mut sink) = sink {
        if let Some(postamble) = formatter.postamble() {
            write_event(&mut *sink, &postamble).await?;
        }
        if let Err(e) = sink.close().await {
            warn!(sink = sink.name(), error = %e, "Failed to close output");
        }
    }

    match outcome? {
        SessionOutcome::Sourcetable(table) => {
            summary.sourcetable.get_or_insert(table);
        }
        SessionOutcome::Stopped => {}
    }
    info!(corrections = summary.corrections, "NTRIP client finished");
    Ok(summary)
}

async fn write_event(sink: &mut dyn OutputSink, event: &OutputEvent) -> CliResult<()> {
    sink.write(event).await.map_err(CliError::Io)
}

fn print_sourcetable(table: &SourceTable, nearest: Option<&NearestMountpoint>) -> CliResult<()> {
    let mut stdout = std::io::stdout().lock();
    for entry in &table.entries {
        writeln!(stdout, "{}", entry.to_row())?;
    }
    match nearest {
        Some(nearest) => writeln!(
            stdout,
            "Nearest mountpoint: {} ({:.2} km)",
            nearest.name, nearest.distance_km
        )?,
        None => writeln!(stdout, "{} mountpoints", table.entries.len())?,
    }
    Ok(())
}
