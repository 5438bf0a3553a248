//! NTRIP client: fetches caster sourcetables and relays correction streams.
//!
//! - [`NtripClient`] - The session loop, reporting through [`NtripEvent`]s
//! - [`NtripClientConfig`] - Caster, mountpoint, GGA and retry settings
//! - [`PositionSource`] - Where GGA feedback takes its position from
//! - [`NtripError`] - Error types, classified for retry
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  GET /MP, GGA  ┌─────────────┐
//! │  NtripClient │ ─────────────▶ │   Caster    │
//! └──────┬───────┘ ◀───────────── └─────────────┘
//!        │          sourcetable or
//!        │          RTCM3/SPARTN stream
//!        ▼
//!  mpsc<NtripEvent>
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gnssrelay_ntrip::{NtripClient, NtripClientConfig};
//!
//! let config = NtripClientConfig::from_url("http://caster.example.com:2101/MP1")?;
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! tokio::spawn(async move { NtripClient::new(config, tx).run(shutdown).await });
//! while let Some(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod position;
pub mod retry;

pub use client::{ClientState, NtripClient, NtripEvent, SessionOutcome};
pub use config::{DEFAULT_TLS_PORT, GgaMode, GgaSettings, NtripClientConfig};
pub use error::{NtripError, NtripErrorCode, NtripResult};
pub use position::{FixedPosition, LivePosition, PositionSource};
pub use retry::{RetryPolicy, RetryState};
