//! The streaming dispatcher.
//!
//! Reads the primary source, frames it into messages, filters and formats
//! them and fans each output event out to every sink. Auxiliary feeders run
//! alongside and write correction frames back into the source.
//!
//! ```text
//! source ─▶ GnssCodec ─▶ MessageFilter ─▶ Formatter ─▶ sinks
//!   ▲
//!   └── feeders (NTRIP, serial, file, pub/sub)
//! ```

use std::sync::Arc;
use std::time::Instant;

use bytes::{Buf, BytesMut};
use gnssrelay_core::{
    Decoded, DecodedMessage, Formatter, GnssCodec, MessageCodec, MessageFilter, OutputEvent,
    RawFrame,
};
use gnssrelay_ntrip::LivePosition;
use tokio::io::AsyncReadExt;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{DispatcherConfig, ErrorMode};
use crate::counters::Counters;
use crate::error::{StreamError, StreamResult};
use crate::feeder::{AuxInput, Feeder};
use crate::signals::ShutdownHandle;
use crate::sink::{OutputSink, SinkSpec};
use crate::source::{OpenSource, SourceOptions};

/// Time source for throttling.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

type FeederOutcome = (String, StreamResult<u64>);

/// A started dispatcher: source open, sinks bound, feeders running.
pub struct Dispatcher {
    config: DispatcherConfig,
    source: OpenSource,
    sinks: Vec<Box<dyn OutputSink>>,
    feeders: JoinSet<FeederOutcome>,
    position: LivePosition,
    shutdown: ShutdownHandle,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

/// Why the read loop ended.
enum Finish {
    Eof,
    Stopped,
    Limit,
}

impl Dispatcher {
    /// Validate the settings, open the source and sinks and spawn the
    /// feeders.
    pub async fn start(
        config: DispatcherConfig,
        source: SourceOptions,
        sinks: Vec<SinkSpec>,
        aux_inputs: Vec<AuxInput>,
    ) -> StreamResult<Self> {
        let source = source.into_spec()?;
        if sinks.is_empty() {
            return Err(StreamError::config("at least one output sink is required"));
        }

        let position = LivePosition::new();
        let shutdown = ShutdownHandle::new();
        let source = source.open().await?;

        let mut opened = Vec::with_capacity(sinks.len());
        for spec in sinks {
            match spec.open(&position).await {
                Ok(sink) => opened.push(sink),
                Err(e) => {
                    close_all(&mut opened).await;
                    return Err(e);
                }
            }
        }

        let mut feeders = JoinSet::new();
        for input in aux_inputs {
            let name = input.describe();
            let feeder = Feeder::new(input, source.writer.clone(), position.clone());
            let shutdown = shutdown.clone();
            feeders.spawn(async move { (name, feeder.run(shutdown).await) });
        }

        info!(
            source = %source.name,
            sinks = opened.len(),
            feeders = feeders.len(),
            protocols = ?config.filter.protocols,
            format = ?config.format,
            "Dispatcher started"
        );

        Ok(Self {
            config,
            source,
            sinks: opened,
            feeders,
            position,
            shutdown,
            clock: Arc::new(SystemClock),
            counters: Counters::default(),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle that stops [`Dispatcher::run`] and every feeder.
    pub fn stop_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Position tapped from GGA and NAV-PVT messages on the source.
    pub fn position(&self) -> LivePosition {
        self.position.clone()
    }

    /// Run until the source ends, a stop is requested, the message limit is
    /// reached or a fatal error occurs. Returns the final counters.
    pub async fn run(mut self) -> StreamResult<Counters> {
        let mut formatter = Formatter::new(self.config.format);
        if let Some(preamble) = formatter.preamble() {
            self.fan_out(&preamble).await;
        }

        let result = self.pump(&mut formatter).await;

        if let Some(postamble) = formatter.postamble() {
            self.fan_out(&postamble).await;
        }
        self.finish().await;

        match result {
            Ok(finish) => {
                let reason = match finish {
                    Finish::Eof => "end of input",
                    Finish::Stopped => "stopped",
                    Finish::Limit => "limit reached",
                };
                info!(source = %self.source.name, reason, "Dispatcher finished");
                Ok(self.counters)
            }
            Err(e) => {
                warn!(source = %self.source.name, error = %e, "Dispatcher failed");
                Err(e)
            }
        }
    }

    async fn pump(&mut self, formatter: &mut Formatter) -> StreamResult<Finish> {
        let mut codec = GnssCodec::new(self.config.filter.protocols).with_validation(self.config.validate);
        let mut filter = MessageFilter::new(self.config.filter.clone());
        let mut buf = BytesMut::with_capacity(self.config.read_size * 2);
        // Stream offset of buf[0].
        let mut offset: u64 = 0;

        loop {
            while !buf.is_empty() {
                match codec.decode(&buf) {
                    Decoded::Message { message, consumed } => {
                        buf.advance(consumed);
                        offset += consumed as u64;
                        self.dispatch(message, &mut filter, formatter).await;
                        if self.config.limit.is_some_and(|limit| self.counters.total >= limit) {
                            return Ok(Finish::Limit);
                        }
                    }
                    Decoded::NeedMore => break,
                    Decoded::Skip(n) => {
                        let skipped = take_frame(&mut buf, &mut offset, n);
                        debug!(offset = skipped.offset, bytes = skipped.len(), "Skipped unframed bytes");
                    }
                    Decoded::Malformed { protocol, reason } => {
                        self.counters.record_decode_error();
                        let bad = take_frame(&mut buf, &mut offset, 1);
                        match self.config.error_mode {
                            ErrorMode::Ignore => {}
                            ErrorMode::Log => {
                                warn!(offset = bad.offset, protocol = %protocol, reason = %reason, "Malformed frame, resynchronizing");
                            }
                            ErrorMode::Raise => {
                                return Err(StreamError::decode(bad.offset, format!("{protocol}: {reason}")));
                            }
                        }
                    }
                }
            }

            buf.reserve(self.config.read_size);
            let shutdown = self.shutdown.clone();
            tokio::select! {
                read = self.source.reader.read_buf(&mut buf) => match read {
                    Ok(0) => return Ok(Finish::Eof),
                    Ok(n) => debug!(bytes = n, "Read from source"),
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) => return Err(StreamError::SourceIo(e)),
                },
                Some(joined) = self.feeders.join_next(), if !self.feeders.is_empty() => {
                    report_feeder(joined);
                }
                _ = shutdown.wait().wait() => return Ok(Finish::Stopped),
            }
        }
    }

    async fn dispatch(&mut self, message: DecodedMessage, filter: &mut MessageFilter, formatter: &mut Formatter) {
        self.position.observe(&message);
        self.counters.record_input(&message.identity);

        if !filter.accept(&message, self.clock.now()) {
            self.counters.record_filtered(&message.identity);
            return;
        }
        self.counters.record_output(&message.identity);

        if let Some(event) = formatter.format(&message) {
            self.fan_out(&event).await;
        }
    }

    /// Write `event` to every sink, dropping sinks that fail.
    async fn fan_out(&mut self, event: &OutputEvent) {
        let mut failed = Vec::new();
        for (index, sink) in self.sinks.iter_mut().enumerate() {
            if let Err(e) = sink.write(event).await {
                warn!(sink = sink.name(), error = %e, "Output sink failed, removing");
                failed.push(index);
            }
        }
        for index in failed.into_iter().rev() {
            let mut sink = self.sinks.remove(index);
            if let Err(e) = sink.close().await {
                warn!(sink = sink.name(), error = %e, "Failed to close output sink");
            }
            if self.sinks.is_empty() {
                warn!("No output sinks left");
            }
        }
    }

    async fn finish(&mut self) {
        self.shutdown.trigger();
        while let Some(joined) = self.feeders.join_next().await {
            report_feeder(joined);
        }
        close_all(&mut self.sinks).await;
        self.counters.log_summary();
    }
}

/// Split `n` bytes (at least one, at most all) off the front of `buf`,
/// advancing the stream offset past them.
fn take_frame(buf: &mut BytesMut, offset: &mut u64, n: usize) -> RawFrame {
    let n = n.clamp(1, buf.len());
    let frame = RawFrame::new(*offset, buf.split_to(n).freeze());
    *offset += n as u64;
    frame
}

fn report_feeder(joined: Result<FeederOutcome, tokio::task::JoinError>) {
    match joined {
        Ok((name, Ok(frames))) => info!(input = %name, frames, "Auxiliary input ended"),
        Ok((name, Err(e))) => warn!(input = %name, error = %e, "Auxiliary input failed, dropping"),
        Err(e) => warn!(error = %e, "Auxiliary input task failed"),
    }
}

async fn close_all(sinks: &mut Vec<Box<dyn OutputSink>>) {
    for mut sink in sinks.drain(..) {
        if let Err(e) = sink.close().await {
            warn!(sink = sink.name(), error = %e, "Failed to close output sink");
        }
    }
}
