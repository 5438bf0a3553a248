//! Subcommand implementations.

pub mod ntrip;
pub mod serve;
pub mod stream;

use gnssrelay_server::{Counters, Dispatcher, ShutdownHandle};
use tracing::debug;

use crate::error::CliResult;

/// Run a started dispatcher, stopping it when `shutdown` fires.
pub(crate) async fn run_dispatcher(
    dispatcher: Dispatcher,
    shutdown: ShutdownHandle,
) -> CliResult<Counters> {
    let stop = dispatcher.stop_handle();
    let forward = tokio::spawn(async move {
        shutdown.wait().wait().await;
        debug!("Forwarding stop to dispatcher");
        stop.trigger();
    });
    let result = dispatcher.run().await;
    forward.abort();
    Ok(result?)
}
