//! Output sinks.
//!
//! Each accepted message becomes one [`OutputEvent`] and every sink receives
//! every event. Text sinks print each representation on its own line; binary
//! sinks pass raw frames through unchanged.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use gnssrelay_core::OutputEvent;
use gnssrelay_ntrip::LivePosition;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::debug;

use crate::broadcast::{BroadcastHandle, BroadcastServer};
use crate::config::{BroadcastConfig, split_port_baud};
use crate::error::{StreamError, StreamResult};
use crate::signals::ShutdownHandle;
use crate::source::SerialSettings;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Destination for output events.
pub trait OutputSink: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    fn write<'a>(&'a mut self, event: &'a OutputEvent) -> BoxFuture<'a, io::Result<()>>;

    /// Flush and release the sink.
    fn close(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Prints each representation as a line of text.
pub struct TextSink<W> {
    name: String,
    writer: W,
}

impl<W> TextSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }
}

impl TextSink<tokio::io::Stdout> {
    pub fn terminal() -> Self {
        Self::new("terminal", tokio::io::stdout())
    }
}

impl<W> OutputSink for TextSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn write<'a>(&'a mut self, event: &'a OutputEvent) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            for representation in &event.representations {
                let mut line = representation.to_text();
                line.push('\n');
                self.writer.write_all(line.as_bytes()).await?;
            }
            self.writer.flush().await
        })
    }

    fn close(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move { self.writer.flush().await })
    }
}

/// Writes each representation as bytes; raw frames are passed through.
pub struct BinarySink<W> {
    name: String,
    writer: W,
}

impl<W> BinarySink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }
}

impl<W> OutputSink for BinarySink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn write<'a>(&'a mut self, event: &'a OutputEvent) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            for representation in &event.representations {
                self.writer.write_all(&representation.to_bytes()).await?;
            }
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            self.writer.flush().await?;
            self.writer.shutdown().await
        })
    }
}

/// Sends each representation to every broadcast client.
pub struct BroadcastSink {
    name: String,
    handle: BroadcastHandle,
    stop: ShutdownHandle,
    server: Option<JoinHandle<()>>,
}

impl BroadcastSink {
    /// Bind `config` and start accepting clients.
    pub async fn start(config: BroadcastConfig, position: Option<LivePosition>) -> StreamResult<Self> {
        let mut server = BroadcastServer::bind(config).await?;
        if let Some(position) = position {
            server = server.with_position(position);
        }
        let name = format!("broadcast {}", server.local_addr());
        let handle = server.handle();
        let stop = ShutdownHandle::new();
        let task = tokio::spawn(server.run(stop.clone()));
        Ok(Self {
            name,
            handle,
            stop,
            server: Some(task),
        })
    }

    pub fn handle(&self) -> BroadcastHandle {
        self.handle.clone()
    }
}

impl OutputSink for BroadcastSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write<'a>(&'a mut self, event: &'a OutputEvent) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            for representation in &event.representations {
                self.handle.broadcast(representation.to_bytes());
            }
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            self.stop.trigger();
            if let Some(server) = self.server.take() {
                server.await.map_err(io::Error::other)?;
            }
            Ok(())
        })
    }
}

/// Handler invoked with every output event.
pub type EventCallback = Arc<dyn Fn(&OutputEvent) + Send + Sync>;

/// Hands each event to an application callback.
#[derive(Clone)]
pub struct CallbackSink {
    name: String,
    callback: EventCallback,
}

impl CallbackSink {
    pub fn new(name: impl Into<String>, callback: EventCallback) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl OutputSink for CallbackSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write<'a>(&'a mut self, event: &'a OutputEvent) -> BoxFuture<'a, io::Result<()>> {
        (self.callback)(event);
        Box::pin(async { Ok(()) })
    }
}

/// Sink specifiers, resolved to open sinks by [`SinkSpec::open`].
pub enum SinkSpec {
    Terminal,
    File(PathBuf),
    Serial(SerialSettings),
    Broadcast(BroadcastConfig),
    Callback(CallbackSink),
    TextFile(PathBuf),
    Custom(Box<dyn OutputSink>),
}

impl fmt::Debug for SinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal => f.write_str("Terminal"),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Serial(serial) => f.debug_tuple("Serial").field(serial).finish(),
            Self::Broadcast(config) => f.debug_tuple("Broadcast").field(&config.address()).finish(),
            Self::Callback(sink) => fmt::Debug::fmt(sink, f),
            Self::TextFile(path) => f.debug_tuple("TextFile").field(path).finish(),
            Self::Custom(sink) => f.debug_tuple("Custom").field(&sink.name()).finish(),
        }
    }
}

impl SinkSpec {
    /// Map a `clioutput` value and its target argument to a sink.
    ///
    /// Callbacks (`4`) carry a handler and cannot be built from text; use
    /// [`SinkSpec::Callback`] directly.
    pub fn from_clioutput(value: u8, target: Option<&str>) -> StreamResult<Self> {
        let required = |what: &str| {
            target
                .filter(|t| !t.trim().is_empty())
                .map(str::trim)
                .ok_or_else(|| StreamError::config(format!("output {value} requires {what}")))
        };
        match value {
            0 => Ok(Self::Terminal),
            1 => Ok(Self::File(PathBuf::from(required("a file path")?))),
            2 => {
                let (port, baud) = split_port_baud(required("port@baud")?)?;
                Ok(Self::Serial(SerialSettings::new(port, baud)))
            }
            3 => Ok(Self::Broadcast(BroadcastConfig::from_address(required("host:port")?)?)),
            4 => Err(StreamError::config("output 4 requires a registered callback")),
            5 => Ok(Self::TextFile(PathBuf::from(required("a file path")?))),
            other => Err(StreamError::config(format!(
                "clioutput must be between 0 and 5, got {other}"
            ))),
        }
    }

    /// Open files, ports and listeners.
    pub async fn open(self, position: &LivePosition) -> StreamResult<Box<dyn OutputSink>> {
        let sink: Box<dyn OutputSink> = match self {
            Self::Terminal => Box::new(TextSink::terminal()),
            Self::File(path) => {
                let name = format!("file {}", path.display());
                let file = tokio::fs::File::create(&path).await.map_err(|e| StreamError::sink_io(&name, e))?;
                Box::new(BinarySink::new(name, BufWriter::new(file)))
            }
            Self::TextFile(path) => {
                let name = format!("text file {}", path.display());
                let file = tokio::fs::File::create(&path).await.map_err(|e| StreamError::sink_io(&name, e))?;
                Box::new(TextSink::new(name, BufWriter::new(file)))
            }
            Self::Serial(serial) => {
                let name = format!("serial {}@{}", serial.port, serial.baud);
                let port = tokio_serial::new(&serial.port, serial.baud)
                    .timeout(serial.timeout)
                    .open_native_async()
                    .map_err(|e| StreamError::sink_io(&name, io::Error::from(e)))?;
                Box::new(BinarySink::new(name, port))
            }
            Self::Broadcast(config) => Box::new(BroadcastSink::start(config, Some(position.clone())).await?),
            Self::Callback(sink) => Box::new(sink),
            Self::Custom(sink) => sink,
        };
        debug!(sink = sink.name(), "Opened output sink");
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use gnssrelay_core::Representation;
    use std::sync::Mutex;

    fn event() -> OutputEvent {
        OutputEvent {
            identity: Some("1005".into()),
            protocol: None,
            representations: vec![
                Representation::Raw(Bytes::from_static(b"\xd3\x00\x13")),
                Representation::Hex("d30013".into()),
            ],
        }
    }

    #[test]
    fn clioutput_mapping() {
        assert!(matches!(SinkSpec::from_clioutput(0, None), Ok(SinkSpec::Terminal)));
        assert!(matches!(
            SinkSpec::from_clioutput(5, Some("out.log")),
            Ok(SinkSpec::TextFile(_))
        ));
        match SinkSpec::from_clioutput(2, Some("/dev/ttyUSB1@38400")) {
            Ok(SinkSpec::Serial(serial)) => assert_eq!(serial.baud, 38400),
            other => panic!("unexpected {other:?}"),
        }
        match SinkSpec::from_clioutput(3, Some("[::]:2101")) {
            Ok(SinkSpec::Broadcast(config)) => assert_eq!(config.host, "::"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clioutput_requires_parameters() {
        for value in [1, 2, 3, 5] {
            let err = SinkSpec::from_clioutput(value, None).unwrap_err();
            assert!(matches!(err, StreamError::Config { .. }), "{value}: {err}");
        }
        assert!(SinkSpec::from_clioutput(2, Some("/dev/ttyUSB1")).is_err());
        assert!(SinkSpec::from_clioutput(4, Some("anything")).is_err());
        assert!(SinkSpec::from_clioutput(6, None).is_err());
    }

    #[tokio::test]
    async fn binary_file_passes_raw_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut sink = SinkSpec::File(path.clone())
            .open(&LivePosition::new())
            .await
            .unwrap();
        sink.write(&event()).await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"\xd3\x00\x13d30013\n");
    }

    #[tokio::test]
    async fn text_file_prints_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut sink = SinkSpec::TextFile(path.clone())
            .open(&LivePosition::new())
            .await
            .unwrap();
        sink.write(&event()).await.unwrap();
        sink.close().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().nth(1), Some("d30013"));
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn callback_sees_every_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let callback: EventCallback = Arc::new(move |event: &OutputEvent| {
            recorder.lock().unwrap().push(event.identity.clone());
        });
        let mut sink = CallbackSink::new("recorder", callback);
        sink.write(&event()).await.unwrap();
        sink.write(&event()).await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_directory_is_sink_error() {
        let err = SinkSpec::File(PathBuf::from("/nonexistent/dir/out.bin"))
            .open(&LivePosition::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::SinkIo { .. }));
    }
}
