//! NTRIP client settings.

use std::time::Duration;

use gnssrelay_core::ProtocolTag;
use gnssrelay_protocol::{Credentials, DEFAULT_PORT, GgaPosition, NtripVersion};
use url::Url;

use crate::error::{NtripError, NtripResult};
use crate::retry::RetryPolicy;

/// Port used for `https` casters when none is given.
pub const DEFAULT_TLS_PORT: u16 = 443;

/// Where GGA reports take their position from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GgaMode {
    /// Live receiver position.
    #[default]
    Live,
    /// The configured reference position.
    Fixed,
}

impl GgaMode {
    /// `0` is live, `1` is fixed.
    pub fn from_value(value: u8) -> NtripResult<Self> {
        match value {
            0 => Ok(Self::Live),
            1 => Ok(Self::Fixed),
            other => Err(NtripError::configuration(format!(
                "ggamode must be 0 (live) or 1 (fixed), got {other}"
            ))),
        }
    }
}

/// Periodic GGA feedback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GgaSettings {
    /// `None` disables feedback.
    pub interval: Option<Duration>,
    pub mode: GgaMode,
}

impl GgaSettings {
    /// Negative intervals disable feedback; 0 is raised to one second.
    pub fn from_interval_secs(secs: i64, mode: GgaMode) -> Self {
        let interval = u64::try_from(secs)
            .ok()
            .map(|s| Duration::from_secs(s.max(1)));
        Self { interval, mode }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }
}

/// Everything needed to talk to one caster.
#[derive(Debug, Clone)]
pub struct NtripClientConfig {
    pub server: String,
    pub port: u16,
    pub https: bool,
    /// Empty requests the sourcetable.
    pub mountpoint: String,
    pub version: NtripVersion,
    pub credentials: Option<Credentials>,
    /// Correction protocol expected on the stream: RTCM3 or SPARTN.
    pub datatype: ProtocolTag,
    pub gga: GgaSettings,
    /// Reference position for fixed GGA mode and nearest-mountpoint lookup.
    pub reference: Option<GgaPosition>,
    pub retry: RetryPolicy,
    pub connect_timeout: Duration,
    /// Silence on an open stream longer than this counts as an interruption.
    pub inactivity_timeout: Duration,
}

impl NtripClientConfig {
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            https: false,
            mountpoint: String::new(),
            version: NtripVersion::default(),
            credentials: None,
            datatype: ProtocolTag::Rtcm3,
            gga: GgaSettings::disabled(),
            reference: None,
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            inactivity_timeout: Duration::from_secs(10),
        }
    }

    /// Parse `http[s]://[user:password@]host[:port]/MOUNTPOINT`.
    pub fn from_url(input: &str) -> NtripResult<Self> {
        let url = Url::parse(input)
            .map_err(|e| NtripError::configuration(format!("invalid caster URL '{input}': {e}")))?;
        let https = match url.scheme() {
            "http" | "ntrip" => false,
            "https" => true,
            other => {
                return Err(NtripError::configuration(format!(
                    "unsupported caster URL scheme '{other}'"
                )));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| NtripError::configuration(format!("caster URL '{input}' has no host")))?;
        let port = url
            .port()
            .unwrap_or(if https { DEFAULT_TLS_PORT } else { DEFAULT_PORT });

        let mut config = Self::new(host.trim_matches(['[', ']']), port).with_https(https);
        config.mountpoint = url.path().trim_start_matches('/').to_string();
        if !url.username().is_empty() {
            config.credentials = Some(Credentials::new(
                url.username(),
                url.password().unwrap_or_default(),
            ));
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    #[must_use]
    pub fn with_mountpoint(mut self, mountpoint: impl Into<String>) -> Self {
        self.mountpoint = mountpoint.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: NtripVersion) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn with_datatype(mut self, datatype: ProtocolTag) -> Self {
        self.datatype = datatype;
        self
    }

    #[must_use]
    pub fn with_gga(mut self, gga: GgaSettings) -> Self {
        self.gga = gga;
        self
    }

    #[must_use]
    pub fn with_reference(mut self, reference: Option<GgaPosition>) -> Self {
        self.reference = reference;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Check settings before any I/O.
    pub fn validate(&self) -> NtripResult<()> {
        if self.server.trim().is_empty() {
            return Err(NtripError::configuration("caster host is required"));
        }
        if self.port == 0 {
            return Err(NtripError::configuration("caster port must be non-zero"));
        }
        if !matches!(self.datatype, ProtocolTag::Rtcm3 | ProtocolTag::Spartn) {
            return Err(NtripError::configuration(format!(
                "datatype must be RTCM or SPARTN, got {}",
                self.datatype
            )));
        }
        if self.gga.is_enabled() && self.gga.mode == GgaMode::Fixed && self.reference.is_none() {
            return Err(NtripError::configuration(
                "fixed GGA mode requires a reference position",
            ));
        }
        if cfg!(not(feature = "tls")) && self.https {
            return Err(NtripError::configuration(
                "https casters need the 'tls' feature",
            ));
        }
        Ok(())
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.server.contains(':') {
            format!("[{}]:{}", self.server, self.port)
        } else {
            format!("{}:{}", self.server, self.port)
        }
    }
}
