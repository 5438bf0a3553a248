//! NTRIP client session loop.
//!
//! ```text
//! Disconnected -> Connecting -> Sourcetable -> Disconnected
//!                     |   ^  \-> Streaming ---/
//!                     v   |
//!                   RetryWait
//! ```
//!
//! An empty mountpoint fetches the sourcetable once and ends the session.
//! Otherwise the correction stream is decoded until stopped, reconnecting
//! under the retry policy on transient failures.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use chrono::Utc;
use gnssrelay_core::{Decoded, DecodedMessage, GnssCodec, MessageCodec};
use gnssrelay_protocol::head::{check_head, find};
use gnssrelay_protocol::{
    BodyKind, ChunkedDecoder, ClientRequest, NearestMountpoint, ResponseHead, SourceTable,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::{GgaMode, NtripClientConfig};
use crate::connection::connect;
use crate::error::{NtripError, NtripErrorCode, NtripResult};
use crate::position::PositionSource;
use crate::retry::RetryState;

/// Body bytes needed before an unlabelled response can be classified.
const SNIFF_LEN: usize = 16;
/// Largest sourcetable accepted.
const MAX_SOURCETABLE: usize = 4 * 1024 * 1024;

/// Observable client state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting { attempt: u32 },
    RetryWait { attempt: u32, delay: Duration },
    Sourcetable,
    Streaming,
}

/// Output of a client session.
#[derive(Debug, Clone, PartialEq)]
pub enum NtripEvent {
    /// The caster's sourcetable, with the mountpoint nearest to the known
    /// position if there is one.
    Sourcetable {
        table: SourceTable,
        nearest: Option<NearestMountpoint>,
    },
    /// A decoded correction message; `raw` holds the wire frame.
    Correction(DecodedMessage),
    /// A GGA sentence sent upstream.
    GgaSent(String),
}

/// How a run ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Sourcetable(SourceTable),
    Stopped,
}

pub struct NtripClient {
    config: NtripClientConfig,
    position: Option<Arc<dyn PositionSource>>,
    events: mpsc::Sender<NtripEvent>,
    state: watch::Sender<ClientState>,
}

impl NtripClient {
    pub fn new(config: NtripClientConfig, events: mpsc::Sender<NtripEvent>) -> Self {
        let (state, _) = watch::channel(ClientState::Disconnected);
        Self {
            config,
            position: None,
            events,
            state,
        }
    }

    /// Live position used for GGA feedback and nearest-mountpoint lookup.
    #[must_use]
    pub fn with_position_source(mut self, source: Arc<dyn PositionSource>) -> Self {
        self.position = Some(source);
        self
    }

    pub fn config(&self) -> &NtripClientConfig {
        &self.config
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ClientState) {
        self.state.send_replace(state);
    }

    /// Run until the sourcetable is fetched, `shutdown` turns true, the
    /// event receiver goes away, or a fatal error occurs.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> NtripResult<SessionOutcome> {
        self.config.validate()?;
        let mut retry = RetryState::new();

        let result = loop {
            if *shutdown.borrow() {
                break Ok(SessionOutcome::Stopped);
            }
            self.set_state(ClientState::Connecting {
                attempt: retry.attempts() + 1,
            });

            let attempt = tokio::select! {
                result = self.session(&mut retry) => result,
                _ = stopped(&mut shutdown) => break Ok(SessionOutcome::Stopped),
            };

            let err = match attempt {
                Ok(outcome) => break Ok(outcome),
                Err(err) if err.is_retryable() => err,
                Err(err) => break Err(err),
            };

            let Some(delay) = retry.record_failure(&self.config.retry, Instant::now()) else {
                break Err(NtripError::retries_exhausted(retry.attempts(), &err));
            };
            warn!(
                server = %self.config.address(),
                attempt = retry.attempts(),
                delay_secs = delay.as_secs_f64(),
                error = %err,
                "NTRIP connection failed, retrying"
            );
            self.set_state(ClientState::RetryWait {
                attempt: retry.attempts(),
                delay,
            });
            tokio::select! {
                _ = sleep(delay) => {}
                _ = stopped(&mut shutdown) => break Ok(SessionOutcome::Stopped),
            }
        };

        self.set_state(ClientState::Disconnected);
        result
    }

    /// GGA sentence for the current position, if feedback is on and a
    /// position is known.
    fn current_gga(&self) -> Option<String> {
        self.config.gga.interval?;
        let position = match self.config.gga.mode {
            GgaMode::Fixed => self.config.reference.clone(),
            GgaMode::Live => self.position.as_ref()?.position(),
        }?;
        Some(position.to_sentence(Utc::now()))
    }

    fn reference_point(&self) -> Option<(f64, f64)> {
        self.position
            .as_ref()
            .and_then(|source| source.position())
            .or_else(|| self.config.reference.clone())
            .map(|p| (p.lat, p.lon))
    }

    async fn emit(&self, event: NtripEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    async fn session(&self, retry: &mut RetryState) -> NtripResult<SessionOutcome> {
        let transport = connect(&self.config).await?;
        let (mut reader, mut writer) = tokio::io::split(transport);

        let gga = self.current_gga();
        let request = ClientRequest::new(
            self.config.server.clone(),
            self.config.port,
            self.config.mountpoint.clone(),
        )
        .with_version(self.config.version)
        .with_credentials(self.config.credentials.clone())
        .with_gga(gga.clone());
        writer.write_all(&request.to_bytes()).await?;
        writer.flush().await?;
        debug!(mountpoint = %self.config.mountpoint, version = %self.config.version, "Sent NTRIP request");
        if let Some(gga) = gga
            && !self.emit(NtripEvent::GgaSent(gga)).await
        {
            return Ok(SessionOutcome::Stopped);
        }

        let mut buf = BytesMut::with_capacity(4096);
        let head_len = loop {
            if let Some(len) = check_head(&buf)? {
                break len;
            }
            self.read_some(&mut reader, &mut buf).await?;
        };
        let head = ResponseHead::parse(&buf[..head_len])?;
        head.ensure_success()?;
        let _ = buf.split_to(head_len);

        let mut chunked = head.is_chunked().then(ChunkedDecoder::new);
        let mut body = BytesMut::new();
        dechunk(&mut chunked, &mut buf, &mut body)?;

        let mut kind = head.body_kind(&body);
        while kind == BodyKind::Unknown && body.len() < SNIFF_LEN {
            self.read_some(&mut reader, &mut buf).await?;
            dechunk(&mut chunked, &mut buf, &mut body)?;
            kind = head.body_kind(&body);
        }

        match kind {
            BodyKind::Sourcetable => {
                self.set_state(ClientState::Sourcetable);
                let declared = head
                    .headers
                    .get("content-length")
                    .and_then(|v| v.parse::<usize>().ok());
                self.read_sourcetable(&mut reader, buf, body, chunked, declared)
                    .await
            }
            BodyKind::Unknown if self.config.mountpoint.is_empty() => Err(
                NtripError::invalid_response("expected a sourcetable for an empty mountpoint"),
            ),
            BodyKind::Stream | BodyKind::Unknown => {
                self.set_state(ClientState::Streaming);
                if !body.is_empty() {
                    retry.reset();
                }
                info!(
                    server = %self.config.address(),
                    mountpoint = %self.config.mountpoint,
                    "Streaming corrections"
                );
                self.stream(reader, writer, buf, body, chunked, retry).await
            }
        }
    }

    /// Read once into `buf`, bounded by the inactivity timeout. Returns the
    /// byte count; end of stream is an interruption.
    async fn read_some<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
        buf: &mut BytesMut,
    ) -> NtripResult<usize> {
        let n = timeout(self.config.inactivity_timeout, reader.read_buf(buf))
            .await
            .map_err(|_| {
                NtripError::timeout(format!(
                    "no data for {}s",
                    self.config.inactivity_timeout.as_secs_f64()
                ))
            })?
            .map_err(|e| NtripError::interrupted(format!("read failed: {e}")).with_source(e))?;
        if n == 0 {
            return Err(NtripError::interrupted("caster closed the connection"));
        }
        Ok(n)
    }

    async fn read_sourcetable<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
        mut buf: BytesMut,
        mut body: BytesMut,
        mut chunked: Option<ChunkedDecoder>,
        declared: Option<usize>,
    ) -> NtripResult<SessionOutcome> {
        loop {
            let complete = declared.is_some_and(|len| body.len() >= len)
                || chunked.as_ref().is_some_and(ChunkedDecoder::is_finished)
                || find(&body, b"ENDSOURCETABLE").is_some();
            if complete {
                break;
            }
            if body.len() > MAX_SOURCETABLE {
                return Err(NtripError::invalid_response("sourcetable too large"));
            }
            match self.read_some(reader, &mut buf).await {
                Ok(_) => dechunk(&mut chunked, &mut buf, &mut body)?,
                Err(err) if err.code() == NtripErrorCode::Interrupted => break,
                Err(err) => return Err(err),
            }
        }

        let table = SourceTable::parse(&String::from_utf8_lossy(&body));
        let nearest = self
            .reference_point()
            .and_then(|(lat, lon)| table.nearest(lat, lon));
        match &nearest {
            Some(nearest) => info!(
                mountpoint = %nearest.name,
                distance_km = nearest.distance_km,
                "Closest mountpoint to reference location"
            ),
            None => info!(entries = table.entries.len(), "Received sourcetable"),
        }
        self.emit(NtripEvent::Sourcetable {
            table: table.clone(),
            nearest,
        })
        .await;
        Ok(SessionOutcome::Sourcetable(table))
    }

    async fn stream<R, W>(
        &self,
        mut reader: R,
        mut writer: W,
        mut buf: BytesMut,
        mut body: BytesMut,
        mut chunked: Option<ChunkedDecoder>,
        retry: &mut RetryState,
    ) -> NtripResult<SessionOutcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut codec = GnssCodec::corrections(self.config.datatype);
        let mut gga_timer = self.config.gga.interval.map(|period| {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        loop {
            if !self.drain(&mut codec, &mut body).await {
                return Ok(SessionOutcome::Stopped);
            }

            tokio::select! {
                read = self.read_some(&mut reader, &mut buf) => {
                    read?;
                    retry.reset();
                    dechunk(&mut chunked, &mut buf, &mut body)?;
                    if chunked.as_ref().is_some_and(ChunkedDecoder::is_finished) {
                        return Err(NtripError::interrupted("caster ended the chunked stream"));
                    }
                }
                _ = tick(&mut gga_timer) => {
                    if let Some(gga) = self.current_gga() {
                        writer.write_all(gga.as_bytes()).await?;
                        writer.flush().await?;
                        debug!(sentence = %gga.trim_end(), "Sent GGA");
                        if !self.emit(NtripEvent::GgaSent(gga)).await {
                            return Ok(SessionOutcome::Stopped);
                        }
                    }
                }
            }
        }
    }

    /// Decode and emit every complete frame in `body`. Returns false once
    /// the event receiver is gone.
    async fn drain(&self, codec: &mut GnssCodec, body: &mut BytesMut) -> bool {
        loop {
            match codec.decode(&body[..]) {
                Decoded::Message { message, consumed } => {
                    let _ = body.split_to(consumed);
                    if !self.emit(NtripEvent::Correction(message)).await {
                        return false;
                    }
                }
                Decoded::NeedMore => return true,
                Decoded::Malformed { protocol, reason } => {
                    warn!(protocol = %protocol, reason = %reason, "Discarding malformed correction frame");
                    let _ = body.split_to(1);
                }
                Decoded::Skip(n) => {
                    let _ = body.split_to(n.min(body.len()));
                }
            }
        }
    }
}

/// Move transport bytes into `body`, de-chunking if needed.
fn dechunk(
    chunked: &mut Option<ChunkedDecoder>,
    buf: &mut BytesMut,
    body: &mut BytesMut,
) -> NtripResult<()> {
    let input = buf.split();
    match chunked {
        Some(decoder) => body.extend_from_slice(&decoder.decode(&input)?),
        None => body.extend_from_slice(&input),
    }
    Ok(())
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolves once the shutdown flag turns true. A dropped sender never stops.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
