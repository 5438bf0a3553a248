//! The primary byte source: serial port, file, TCP socket or an injected
//! stream.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

use crate::config::split_host_port;
use crate::error::{StreamError, StreamResult};

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Shared write access to the primary source.
///
/// Auxiliary feeders write whole frames through this; the mutex keeps
/// frames from interleaving.
#[derive(Clone)]
pub struct SourceWriter {
    inner: Arc<Mutex<BoxedWriter>>,
}

impl fmt::Debug for SourceWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceWriter").finish_non_exhaustive()
    }
}

impl SourceWriter {
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write one complete frame.
    pub async fn write_frame(&self, frame: &[u8]) -> io::Result<()> {
        let mut writer = self.inner.lock().await;
        writer.write_all(frame).await?;
        writer.flush().await
    }
}

/// Serial port parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port: String,
    pub baud: u32,
    pub timeout: Duration,
}

impl SerialSettings {
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            timeout: Duration::from_secs(3),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A caller-supplied byte stream.
pub struct InjectedStream {
    pub name: String,
    pub reader: BoxedReader,
    /// `None` makes the source read-only.
    pub writer: Option<BoxedWriter>,
}

impl InjectedStream {
    /// Wrap a bidirectional stream.
    pub fn duplex<S>(name: impl Into<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            name: name.into(),
            reader: Box::new(reader),
            writer: Some(Box::new(writer)),
        }
    }

    /// Wrap a read-only stream.
    pub fn read_only(name: impl Into<String>, reader: impl AsyncRead + Unpin + Send + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Box::new(reader),
            writer: None,
        }
    }
}

/// Exactly one primary source.
pub enum SourceSpec {
    Serial(SerialSettings),
    File(PathBuf),
    Socket { host: String, port: u16 },
    Stream(InjectedStream),
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Source specifiers as supplied by a caller; exactly one must be set.
#[derive(Default)]
pub struct SourceOptions {
    pub serial: Option<SerialSettings>,
    pub file: Option<PathBuf>,
    /// `host:port`.
    pub socket: Option<String>,
    pub stream: Option<InjectedStream>,
}

impl SourceOptions {
    pub fn into_spec(self) -> StreamResult<SourceSpec> {
        let given = usize::from(self.serial.is_some())
            + usize::from(self.file.is_some())
            + usize::from(self.socket.is_some())
            + usize::from(self.stream.is_some());
        match given {
            0 => {
                return Err(StreamError::config(
                    "no input source: give a serial port, file, socket or stream",
                ));
            }
            1 => {}
            n => {
                return Err(StreamError::config(format!(
                    "exactly one input source is allowed, got {n}"
                )));
            }
        }

        if let Some(serial) = self.serial {
            return Ok(SourceSpec::Serial(serial));
        }
        if let Some(file) = self.file {
            return Ok(SourceSpec::File(file));
        }
        if let Some(stream) = self.stream {
            return Ok(SourceSpec::Stream(stream));
        }
        let socket = self.socket.unwrap_or_default();
        let (host, port) = split_host_port(&socket)?;
        Ok(SourceSpec::Socket { host, port })
    }
}

/// An opened source.
pub struct OpenSource {
    pub name: String,
    pub reader: BoxedReader,
    /// `None` for read-only sources such as files.
    pub writer: Option<SourceWriter>,
}

impl SourceSpec {
    pub fn describe(&self) -> String {
        match self {
            Self::Serial(serial) => format!("serial {}@{}", serial.port, serial.baud),
            Self::File(path) => format!("file {}", path.display()),
            Self::Socket { host, port } => format!("socket {host}:{port}"),
            Self::Stream(stream) => format!("stream {}", stream.name),
        }
    }

    pub async fn open(self) -> StreamResult<OpenSource> {
        let name = self.describe();
        let (reader, writer): (BoxedReader, Option<BoxedWriter>) = match self {
            Self::Serial(serial) => {
                let stream = tokio_serial::new(&serial.port, serial.baud)
                    .timeout(serial.timeout)
                    .open_native_async()
                    .map_err(|e| StreamError::SourceIo(io::Error::from(e)))?;
                let (reader, writer) = tokio::io::split(stream);
                (Box::new(reader), Some(Box::new(writer)))
            }
            Self::File(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(StreamError::SourceIo)?;
                (Box::new(file), None)
            }
            Self::Socket { host, port } => {
                let stream = TcpStream::connect((host.as_str(), port))
                    .await
                    .map_err(StreamError::SourceIo)?;
                let (reader, writer) = stream.into_split();
                (Box::new(reader), Some(Box::new(writer)))
            }
            Self::Stream(stream) => (stream.reader, stream.writer),
        };
        info!(source = %name, writable = writer.is_some(), "Opened input source");
        debug!(source = %name, "Source ready");

        Ok(OpenSource {
            name,
            reader,
            writer: writer.map(SourceWriter::new),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn requires_exactly_one_source() {
        let err = SourceOptions::default().into_spec().unwrap_err();
        assert!(matches!(err, StreamError::Config { .. }));

        let both = SourceOptions {
            file: Some(PathBuf::from("a.log")),
            socket: Some("localhost:50010".into()),
            ..Default::default()
        };
        let err = both.into_spec().unwrap_err();
        assert!(err.to_string().contains("got 2"));
    }

    #[test]
    fn socket_needs_port() {
        let options = SourceOptions {
            socket: Some("localhost".into()),
            ..Default::default()
        };
        assert!(options.into_spec().is_err());
    }

    #[tokio::test]
    async fn file_source_is_read_only() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"$GPGGA").unwrap();

        let spec = SourceOptions {
            file: Some(file.path().to_path_buf()),
            ..Default::default()
        }
        .into_spec()
        .unwrap();
        let mut source = spec.open().await.unwrap();
        assert!(source.writer.is_none());

        let mut content = Vec::new();
        source.reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"$GPGGA");
    }

    #[tokio::test]
    async fn missing_file_is_source_error() {
        let spec = SourceSpec::File(PathBuf::from("/nonexistent/input.ubx"));
        assert!(matches!(spec.open().await, Err(StreamError::SourceIo(_))));
    }

    #[tokio::test]
    async fn injected_stream_is_writable() {
        let (local, mut remote) = tokio::io::duplex(64);
        let spec = SourceSpec::Stream(InjectedStream::duplex("receiver", local));
        let source = spec.open().await.unwrap();

        let writer = source.writer.unwrap();
        writer.write_frame(b"\xd3\x00\x00").await.unwrap();
        let mut buf = [0u8; 3];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\xd3\x00\x00");
    }
}
