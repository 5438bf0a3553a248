//! Streaming dispatcher and broadcast server.
//!
//! This crate moves GNSS data between a receiver and everything around it:
//! - [`Dispatcher`] reads one primary source, frames, filters and formats
//!   its messages and fans them out to [`OutputSink`]s
//! - [`Feeder`]s write correction frames from auxiliary inputs (NTRIP,
//!   serial, file, pub/sub) back into the source
//! - [`BroadcastServer`] relays output to TCP clients, optionally behind an
//!   NTRIP caster handshake and TLS
//!
//! # Example
//!
//! ```rust,no_run
//! use gnssrelay_core::{FilterSpec, FormatSpec, ProtocolMask};
//! use gnssrelay_server::{Dispatcher, DispatcherConfig, SinkSpec, SourceOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DispatcherConfig::new(FilterSpec::new(ProtocolMask::DEFAULT), FormatSpec::PARSED);
//!     let source = SourceOptions {
//!         file: Some("capture.ubx".into()),
//!         ..Default::default()
//!     };
//!     let dispatcher = Dispatcher::start(config, source, vec![SinkSpec::Terminal], vec![]).await?;
//!     let counters = dispatcher.run().await?;
//!     println!("{} messages", counters.total);
//!     Ok(())
//! }
//! ```

mod broadcast;
mod caster;
mod config;
mod counters;
mod dispatcher;
mod error;
mod feeder;
mod signals;
mod sink;
mod source;
mod tls;

pub use broadcast::{BroadcastHandle, BroadcastServer, ClientSummary};
pub use caster::sourcetable as caster_sourcetable;
pub use config::{
    BroadcastConfig, CasterConfig, DispatcherConfig, ErrorMode, TlsPaths, split_host_port,
    split_port_baud,
};
pub use counters::Counters;
pub use dispatcher::{Clock, Dispatcher, SystemClock};
pub use error::{StreamError, StreamResult};
pub use feeder::{AuxInput, Feeder, PubSubTransport};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use sink::{
    BinarySink, BoxFuture, BroadcastSink, CallbackSink, EventCallback, OutputSink, SinkSpec,
    TextSink,
};
pub use source::{
    BoxedReader, BoxedWriter, InjectedStream, OpenSource, SerialSettings, SourceOptions,
    SourceSpec, SourceWriter,
};
pub use tls::build_acceptor;
