//! `serve`: relay a receiver to TCP clients, optionally as an NTRIP caster.

use gnssrelay_core::FormatSpec;
use gnssrelay_server::{Counters, Dispatcher, ShutdownHandle, SinkSpec};
use tracing::info;

use crate::config::{ServeSettings, aux_input};
use crate::error::CliResult;

pub async fn run(settings: ServeSettings, shutdown: ShutdownHandle) -> CliResult<Counters> {
    let config = settings.processing.to_dispatcher_config(FormatSpec::BINARY)?;
    let source = settings.source.to_options()?;
    let broadcast = settings.broadcast_config()?;
    let inputs = aux_input(&settings.input, &settings.credentials, &settings.gga)?
        .into_iter()
        .collect::<Vec<_>>();

    info!(
        address = %broadcast.address(),
        caster = broadcast.caster.as_ref().map(|c| c.mountpoint.as_str()),
        tls = broadcast.tls.is_some(),
        max_clients = broadcast.max_clients,
        "Starting server"
    );
    let dispatcher =
        Dispatcher::start(config, source, vec![SinkSpec::Broadcast(broadcast)], inputs).await?;
    super::run_dispatcher(dispatcher, shutdown).await
}
