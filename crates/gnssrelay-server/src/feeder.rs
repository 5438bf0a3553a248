//! Auxiliary inputs.
//!
//! A feeder reads correction data from a secondary input (an NTRIP caster, a
//! serial port, a file or a pub/sub topic) and writes each complete frame to
//! the primary source, typically to feed RTCM3 or SPARTN corrections to a
//! receiver. Each feeder runs as its own task; if the primary source is not
//! writable the frames are discarded.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use gnssrelay_core::{Decoded, GnssCodec, MessageCodec, ProtocolMask, ProtocolTag};
use gnssrelay_ntrip::{LivePosition, NtripClient, NtripClientConfig, NtripEvent, SessionOutcome};
use gnssrelay_protocol::Credentials;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::split_port_baud;
use crate::error::{StreamError, StreamResult};
use crate::signals::ShutdownHandle;
use crate::sink::BoxFuture;
use crate::source::{SerialSettings, SourceWriter};

/// Message source for pub/sub delivered corrections, such as SPARTN over
/// MQTT. No transport ships with this crate; applications provide one.
pub trait PubSubTransport: Send {
    fn name(&self) -> &str;

    /// Next complete frame, or `None` once the subscription ends.
    fn next_frame(&mut self) -> BoxFuture<'_, io::Result<Option<Bytes>>>;
}

/// A secondary input.
pub enum AuxInput {
    Ntrip(NtripClientConfig),
    Serial(SerialSettings),
    File(PathBuf),
    PubSub(Box<dyn PubSubTransport>),
}

impl fmt::Debug for AuxInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl AuxInput {
    /// Map a `cliinput` value and its target argument. `0` means no input.
    pub fn from_cliinput(
        value: u8,
        target: Option<&str>,
        credentials: Option<Credentials>,
    ) -> StreamResult<Option<Self>> {
        let required = |what: &str| {
            target
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| StreamError::config(format!("input {value} requires {what}")))
        };
        let ntrip = |datatype: ProtocolTag| -> StreamResult<Self> {
            let mut config = NtripClientConfig::from_url(required("an NTRIP URL")?)?
                .with_datatype(datatype);
            if config.credentials.is_none() {
                config = config.with_credentials(credentials.clone());
            }
            config.validate()?;
            Ok(Self::Ntrip(config))
        };

        match value {
            0 => Ok(None),
            1 => ntrip(ProtocolTag::Rtcm3).map(Some),
            2 => ntrip(ProtocolTag::Spartn).map(Some),
            3 => Err(StreamError::config(
                "input 3 (MQTT) requires a pub/sub transport, none is available",
            )),
            4 => {
                let (port, baud) = split_port_baud(required("port@baud")?)?;
                Ok(Some(Self::Serial(SerialSettings::new(port, baud))))
            }
            5 => Ok(Some(Self::File(PathBuf::from(required("a file path")?)))),
            other => Err(StreamError::config(format!(
                "cliinput must be between 0 and 5, got {other}"
            ))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Ntrip(config) => format!("ntrip {}/{}", config.address(), config.mountpoint),
            Self::Serial(serial) => format!("serial {}@{}", serial.port, serial.baud),
            Self::File(path) => format!("file {}", path.display()),
            Self::PubSub(transport) => format!("pubsub {}", transport.name()),
        }
    }
}

/// Runs one auxiliary input into the primary source.
pub struct Feeder {
    input: AuxInput,
    target: Option<SourceWriter>,
    position: LivePosition,
}

impl Feeder {
    pub fn new(input: AuxInput, target: Option<SourceWriter>, position: LivePosition) -> Self {
        Self {
            input,
            target,
            position,
        }
    }

    /// Forward frames until the input ends or `shutdown` fires. Returns the
    /// number of frames forwarded.
    pub async fn run(self, shutdown: ShutdownHandle) -> StreamResult<u64> {
        let name = self.input.describe();
        let mut sink = FrameSink::new(&name, self.target);
        info!(input = %name, writable = sink.target.is_some(), "Starting auxiliary input");
        if sink.target.is_none() {
            warn!(input = %name, "Primary source is not writable, auxiliary data will be discarded");
        }

        match self.input {
            AuxInput::Ntrip(config) => run_ntrip(config, self.position, &mut sink, shutdown).await?,
            AuxInput::Serial(serial) => {
                let port = tokio_serial::new(&serial.port, serial.baud)
                    .timeout(serial.timeout)
                    .open_native_async()
                    .map_err(|e| StreamError::aux_io(&name, io::Error::from(e).to_string()))?;
                pump(port, &mut sink, shutdown).await?;
            }
            AuxInput::File(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| StreamError::aux_io(&name, e.to_string()))?;
                pump(file, &mut sink, shutdown).await?;
            }
            AuxInput::PubSub(mut transport) => loop {
                let frame = tokio::select! {
                    frame = transport.next_frame() => {
                        frame.map_err(|e| StreamError::aux_io(&name, e.to_string()))?
                    }
                    _ = shutdown.wait().wait() => break,
                };
                let Some(frame) = frame else { break };
                sink.forward(&frame).await?;
            },
        }

        info!(input = %name, frames = sink.forwarded, "Auxiliary input finished");
        Ok(sink.forwarded)
    }
}

struct FrameSink {
    name: String,
    target: Option<SourceWriter>,
    forwarded: u64,
}

impl FrameSink {
    fn new(name: &str, target: Option<SourceWriter>) -> Self {
        Self {
            name: name.to_string(),
            target,
            forwarded: 0,
        }
    }

    async fn forward(&mut self, frame: &[u8]) -> StreamResult<()> {
        if let Some(target) = &self.target {
            target
                .write_frame(frame)
                .await
                .map_err(|e| StreamError::aux_io(&self.name, format!("writing to source: {e}")))?;
            self.forwarded += 1;
        }
        Ok(())
    }
}

async fn run_ntrip(
    config: NtripClientConfig,
    position: LivePosition,
    sink: &mut FrameSink,
    shutdown: ShutdownHandle,
) -> StreamResult<()> {
    let (tx, mut events) = mpsc::channel(64);
    let client = NtripClient::new(config, tx).with_position_source(Arc::new(position));
    let session = tokio::spawn({
        let shutdown = shutdown.subscribe();
        async move { client.run(shutdown).await }
    });

    while let Some(event) = events.recv().await {
        match event {
            NtripEvent::Correction(message) => {
                debug!(identity = %message.identity, "Correction received");
                if let Err(e) = sink.forward(&message.raw).await {
                    session.abort();
                    return Err(e);
                }
            }
            NtripEvent::GgaSent(sentence) => debug!(gga = %sentence.trim_end(), "GGA sent"),
            NtripEvent::Sourcetable { .. } => {}
        }
    }

    let outcome = session
        .await
        .map_err(|e| StreamError::aux_io(&sink.name, e.to_string()))??;
    if let SessionOutcome::Sourcetable(table) = outcome {
        warn!(
            input = %sink.name,
            mountpoints = table.entries.len(),
            "Caster returned a sourcetable instead of a stream"
        );
    }
    Ok(())
}

/// Frame a byte stream and forward each complete frame.
async fn pump<R>(mut reader: R, sink: &mut FrameSink, shutdown: ShutdownHandle) -> StreamResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut codec = GnssCodec::new(ProtocolMask::all());
    let mut buf = BytesMut::with_capacity(8192);

    loop {
        loop {
            match codec.decode(&buf) {
                Decoded::Message { consumed, .. } => {
                    let frame = buf.split_to(consumed);
                    sink.forward(&frame).await?;
                }
                Decoded::Malformed { protocol, reason } => {
                    debug!(input = %sink.name, protocol = %protocol, reason, "Skipping malformed frame");
                    buf.advance(1);
                }
                Decoded::Skip(n) => buf.advance(n.min(buf.len())),
                Decoded::NeedMore => break,
            }
            if buf.is_empty() {
                break;
            }
        }

        let read = tokio::select! {
            read = reader.read_buf(&mut buf) => read,
            _ = shutdown.wait().wait() => return Ok(()),
        };
        match read {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => return Err(StreamError::aux_io(&sink.name, e.to_string())),
        }
    }
}
