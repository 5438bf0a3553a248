//! Dispatcher and broadcast server configuration.

use std::path::PathBuf;
use std::time::Duration;

use gnssrelay_core::{FilterSpec, FormatSpec};
use gnssrelay_protocol::Credentials;

use crate::error::{StreamError, StreamResult};

/// What to do with frames that fail to decode (`quitonerror`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// Count and resynchronize silently.
    Ignore,
    /// Count, warn and resynchronize.
    #[default]
    Log,
    /// Stop with a decode error.
    Raise,
}

impl ErrorMode {
    pub fn from_value(value: u8) -> StreamResult<Self> {
        match value {
            0 => Ok(Self::Ignore),
            1 => Ok(Self::Log),
            2 => Ok(Self::Raise),
            other => Err(StreamError::config(format!(
                "quitonerror must be 0, 1 or 2, got {other}"
            ))),
        }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub filter: FilterSpec,
    pub format: FormatSpec,
    pub error_mode: ErrorMode,
    /// Verify checksums and CRCs.
    pub validate: bool,
    /// Stop after this many decoded messages.
    pub limit: Option<u64>,
    pub read_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            filter: FilterSpec::default(),
            format: FormatSpec::default(),
            error_mode: ErrorMode::default(),
            validate: true,
            limit: None,
            read_size: 4096,
        }
    }
}

impl DispatcherConfig {
    pub fn new(filter: FilterSpec, format: FormatSpec) -> Self {
        Self {
            filter,
            format,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// `0` means unlimited.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }
}

/// Certificate chain and private key, PEM encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    /// Defaults to the certificate file, which then holds both.
    pub key: Option<PathBuf>,
}

impl TlsPaths {
    pub fn combined(pem: impl Into<PathBuf>) -> Self {
        Self {
            cert: pem.into(),
            key: None,
        }
    }

    pub fn key_path(&self) -> &PathBuf {
        self.key.as_ref().unwrap_or(&self.cert)
    }
}

/// Single-mountpoint NTRIP caster settings (`ntripmode=1`).
#[derive(Debug, Clone)]
pub struct CasterConfig {
    pub mountpoint: String,
    /// `None` admits any client.
    pub credentials: Option<Credentials>,
}

impl CasterConfig {
    pub fn new(mountpoint: impl Into<String>) -> Self {
        Self {
            mountpoint: mountpoint.into(),
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Broadcast server settings.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// IPv4 or IPv6 literal, or a resolvable name.
    pub host: String,
    pub port: u16,
    pub max_clients: usize,
    /// A write stalled longer than this drops the client.
    pub write_timeout: Duration,
    /// Chunks queued per client before it counts as stalled.
    pub queue_capacity: usize,
    /// Bound on reading a caster request.
    pub handshake_timeout: Duration,
    pub caster: Option<CasterConfig>,
    pub tls: Option<TlsPaths>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50010,
            max_clients: 5,
            write_timeout: Duration::from_secs(5),
            queue_capacity: 256,
            handshake_timeout: Duration::from_secs(10),
            caster: None,
            tls: None,
        }
    }
}

impl BroadcastConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Parse `host:port` or `[v6]:port`.
    pub fn from_address(address: &str) -> StreamResult<Self> {
        let (host, port) = split_host_port(address)?;
        Ok(Self::new(host, port))
    }

    #[must_use]
    pub fn with_max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_caster(mut self, caster: Option<CasterConfig>) -> Self {
        self.caster = caster;
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: Option<TlsPaths>) -> Self {
        self.tls = tls;
        self
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Split `host:port`, accepting a bracketed IPv6 host.
pub fn split_host_port(address: &str) -> StreamResult<(String, u16)> {
    let invalid = || StreamError::config(format!("expected host:port, got '{address}'"));
    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

/// Split `port@baud` as used by serial sinks and inputs.
pub fn split_port_baud(spec: &str) -> StreamResult<(String, u32)> {
    let invalid = || StreamError::config(format!("expected port@baud, got '{spec}'"));
    let (port, baud) = spec.rsplit_once('@').ok_or_else(invalid)?;
    if port.is_empty() {
        return Err(invalid());
    }
    let baud = baud.parse::<u32>().map_err(|_| invalid())?;
    Ok((port.to_string(), baud))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_broadcast_config() {
        let config = BroadcastConfig::default();
        assert_eq!(config.max_clients, 5);
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert!(config.caster.is_none());
    }

    #[test]
    fn parses_addresses() {
        assert_eq!(
            split_host_port("localhost:50010").unwrap(),
            ("localhost".to_string(), 50010)
        );
        assert_eq!(split_host_port("[::]:2101").unwrap(), ("::".to_string(), 2101));
        assert!(split_host_port("nohost").is_err());
        assert!(split_host_port(":80").is_err());
        assert!(split_host_port("host:99999").is_err());

        let config = BroadcastConfig::from_address("[::1]:2101").unwrap();
        assert_eq!(config.address(), "[::1]:2101");
    }

    #[test]
    fn parses_serial_specs() {
        assert_eq!(
            split_port_baud("/dev/ttyACM0@115200").unwrap(),
            ("/dev/ttyACM0".to_string(), 115200)
        );
        assert!(split_port_baud("/dev/ttyACM0").is_err());
        assert!(split_port_baud("@9600").is_err());
    }

    #[test]
    fn error_modes() {
        assert_eq!(ErrorMode::from_value(0).unwrap(), ErrorMode::Ignore);
        assert_eq!(ErrorMode::from_value(2).unwrap(), ErrorMode::Raise);
        assert!(ErrorMode::from_value(3).is_err());
    }

    #[test]
    fn zero_limit_is_unlimited() {
        assert_eq!(DispatcherConfig::default().with_limit(0).limit, None);
        assert_eq!(DispatcherConfig::default().with_limit(10).limit, Some(10));
    }

    #[test]
    fn tls_key_defaults_to_cert() {
        let paths = TlsPaths::combined("/etc/gnssrelay/server.pem");
        assert_eq!(paths.key_path(), &PathBuf::from("/etc/gnssrelay/server.pem"));
    }
}
