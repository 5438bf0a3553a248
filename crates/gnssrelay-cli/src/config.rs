//! Command configuration.
//!
//! Each command reads a flat TOML file whose keys match the long option
//! names. The file is taken from `--config`, else from the command's
//! environment variable, else from `~/.config/gnssrelay/<command>.toml`
//! when present. Options given on the command line override the file.
//!
//! ```toml
//! # ~/.config/gnssrelay/stream.toml
//! port = "/dev/ttyACM0"
//! baudrate = 38400
//! protfilter = 5
//! msgfilter = "GNGGA,1005(10)"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use gnssrelay_core::{FilterSpec, FormatSpec, ProtocolTag};
use gnssrelay_ntrip::{GgaMode, GgaSettings, NtripClientConfig, RetryPolicy};
use gnssrelay_protocol::{Credentials, GgaPosition, NtripVersion};
use gnssrelay_server::{
    AuxInput, BroadcastConfig, CasterConfig, DispatcherConfig, ErrorMode, SerialSettings,
    SourceOptions, TlsPaths,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cli::{
    CredentialArgs, GgaArgs, InputArgs, NtripArgs, OutputArgs, ProcessingArgs, ServeArgs,
    SourceArgs, StreamArgs,
};
use crate::error::{CliError, CliResult};

/// Config file variable for `stream`.
pub const STREAM_CONF_ENV: &str = "GNSSSTREAMER_CONF";
/// Config file variable for `serve`.
pub const SERVE_CONF_ENV: &str = "GNSSSERVER_CONF";
/// Config file variable for `ntrip`.
pub const NTRIP_CONF_ENV: &str = "GNSSNTRIPCLIENT_CONF";

const DEFAULT_CLIENT_USER: &str = "anon";
const DEFAULT_CLIENT_PASSWORD: &str = "password";

/// Overwrite settings fields with the arguments that were given.
macro_rules! merge {
    ($settings:expr, $args:expr; $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $args.$field.clone() {
                $settings.$field = value.into();
            }
        )+
    };
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Resolve the config file for a command.
///
/// An explicit path or environment variable must point at a readable file;
/// the per-user default is optional.
pub fn config_path(explicit: Option<&Path>, env_var: &str, command: &str) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(env_var).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let path = default_config_dir()?.join(format!("{command}.toml"));
    path.exists().then_some(path)
}

/// `~/.config/gnssrelay` or the platform equivalent.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gnssrelay"))
}

/// Load settings from a file, or defaults when there is none.
pub fn load<T>(explicit: Option<&Path>, env_var: &str, command: &str) -> CliResult<T>
where
    T: DeserializeOwned + Default,
{
    match config_path(explicit, env_var, command) {
        Some(path) => load_from(&path),
        None => Ok(T::default()),
    }
}

pub fn load_from<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| CliError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Shared sections
// ---------------------------------------------------------------------------

/// Primary source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub port: Option<String>,
    pub baudrate: u32,
    /// Seconds.
    pub timeout: f64,
    pub filename: Option<PathBuf>,
    /// `host:port`.
    pub socket: Option<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            port: None,
            baudrate: 9600,
            timeout: 3.0,
            filename: None,
            socket: None,
        }
    }
}

impl SourceSettings {
    pub fn merge(&mut self, args: &SourceArgs) {
        merge!(self, args; port, baudrate, timeout, filename, socket);
    }

    pub fn to_options(&self) -> CliResult<SourceOptions> {
        let serial = match &self.port {
            Some(port) => Some(
                SerialSettings::new(port.clone(), self.baudrate)
                    .with_timeout(seconds(self.timeout, "timeout")?),
            ),
            None => None,
        };
        Ok(SourceOptions {
            serial,
            file: self.filename.clone(),
            socket: self.socket.clone(),
            stream: None,
        })
    }
}

/// Decode, filter and format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    pub protfilter: u32,
    pub msgfilter: Option<String>,
    /// Unset means the command's default format.
    pub format: Option<u32>,
    pub quitonerror: u8,
    pub validate: bool,
    pub limit: u64,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            // NMEA, UBX and RTCM3
            protfilter: 0b111,
            msgfilter: None,
            format: None,
            quitonerror: 1,
            validate: true,
            limit: 0,
        }
    }
}

impl ProcessingSettings {
    pub fn merge(&mut self, args: &ProcessingArgs) {
        merge!(self, args; protfilter, msgfilter, format, quitonerror, validate, limit);
    }

    pub fn to_dispatcher_config(&self, default_format: FormatSpec) -> CliResult<DispatcherConfig> {
        let mut filter = FilterSpec::from_bits(self.protfilter)?;
        if let Some(spec) = self.msgfilter.as_deref().filter(|s| !s.trim().is_empty()) {
            filter = filter.with_identities(spec)?;
        }
        let format = match self.format {
            Some(bits) => FormatSpec::from_value(bits)?,
            None => default_format,
        };
        Ok(DispatcherConfig::new(filter, format)
            .with_error_mode(ErrorMode::from_value(self.quitonerror)?)
            .with_validation(self.validate)
            .with_limit(self.limit))
    }
}

/// Output sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub clioutput: u8,
    pub output: Option<String>,
}

impl OutputSettings {
    pub fn merge(&mut self, args: &OutputArgs) {
        merge!(self, args; clioutput, output);
    }
}

/// Auxiliary input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    pub cliinput: u8,
    pub input: Option<String>,
}

impl InputSettings {
    pub fn merge(&mut self, args: &InputArgs) {
        merge!(self, args; cliinput, input);
    }
}

/// NTRIP user and password.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub ntripuser: Option<String>,
    pub ntrippassword: Option<String>,
}

impl CredentialSettings {
    pub fn merge(&mut self, args: &CredentialArgs) {
        merge!(self, args; ntripuser, ntrippassword);
    }

    /// `None` unless a user is set.
    pub fn credentials(&self) -> Option<Credentials> {
        let user = self.ntripuser.as_deref().filter(|u| !u.is_empty())?;
        Some(Credentials::new(
            user,
            self.ntrippassword.as_deref().unwrap_or_default(),
        ))
    }

    /// As sent by an NTRIP client, falling back to `anon`/`password`.
    pub fn client_credentials(&self) -> Credentials {
        self.credentials().unwrap_or_else(|| {
            Credentials::new(DEFAULT_CLIENT_USER, DEFAULT_CLIENT_PASSWORD)
        })
    }
}

/// GGA feedback and reference position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GgaFileSettings {
    /// Seconds; negative disables.
    pub ggainterval: i64,
    pub ggamode: u8,
    pub reflat: Option<f64>,
    pub reflon: Option<f64>,
    pub refalt: f64,
    pub refsep: f64,
}

impl Default for GgaFileSettings {
    fn default() -> Self {
        Self {
            ggainterval: -1,
            ggamode: 0,
            reflat: None,
            reflon: None,
            refalt: 0.0,
            refsep: 0.0,
        }
    }
}

impl GgaFileSettings {
    pub fn merge(&mut self, args: &GgaArgs) {
        merge!(self, args; ggainterval, ggamode, reflat, reflon, refalt, refsep);
    }

    pub fn gga(&self) -> CliResult<GgaSettings> {
        Ok(GgaSettings::from_interval_secs(
            self.ggainterval,
            GgaMode::from_value(self.ggamode)?,
        ))
    }

    /// Set only when both coordinates are.
    pub fn reference(&self) -> Option<GgaPosition> {
        Some(GgaPosition::new(self.reflat?, self.reflon?).with_height(self.refalt, self.refsep))
    }

    /// Apply to an NTRIP client configuration.
    pub fn configure(&self, config: NtripClientConfig) -> CliResult<NtripClientConfig> {
        let config = config
            .with_gga(self.gga()?)
            .with_reference(self.reference());
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// `stream` settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    #[serde(flatten)]
    pub source: SourceSettings,
    #[serde(flatten)]
    pub processing: ProcessingSettings,
    #[serde(flatten)]
    pub output: OutputSettings,
    #[serde(flatten)]
    pub input: InputSettings,
    #[serde(flatten)]
    pub credentials: CredentialSettings,
    #[serde(flatten)]
    pub gga: GgaFileSettings,
}

impl StreamSettings {
    pub fn merge(&mut self, args: &StreamArgs) {
        self.source.merge(&args.source);
        self.processing.merge(&args.processing);
        self.output.merge(&args.output);
        self.input.merge(&args.input);
        self.credentials.merge(&args.credentials);
        self.gga.merge(&args.gga);
    }
}

/// `serve` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeSettings {
    #[serde(flatten)]
    pub source: SourceSettings,
    #[serde(flatten)]
    pub processing: ProcessingSettings,
    #[serde(flatten)]
    pub input: InputSettings,
    #[serde(flatten)]
    pub credentials: CredentialSettings,
    #[serde(flatten)]
    pub gga: GgaFileSettings,
    pub hostip: String,
    /// Defaults to 50010, or 2101 in caster mode.
    pub outport: Option<u16>,
    pub ntripmode: u8,
    pub mountpoint: String,
    pub maxclients: usize,
    pub tlspem: Option<PathBuf>,
    pub tlskey: Option<PathBuf>,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            processing: ProcessingSettings::default(),
            input: InputSettings::default(),
            credentials: CredentialSettings::default(),
            gga: GgaFileSettings::default(),
            hostip: "0.0.0.0".to_string(),
            outport: None,
            ntripmode: 0,
            mountpoint: "gnssrelay".to_string(),
            maxclients: 5,
            tlspem: None,
            tlskey: None,
        }
    }
}

impl ServeSettings {
    pub fn merge(&mut self, args: &ServeArgs) {
        self.source.merge(&args.source);
        self.processing.merge(&args.processing);
        self.input.merge(&args.input);
        self.credentials.merge(&args.credentials);
        self.gga.merge(&args.gga);
        merge!(self, args; hostip, outport, ntripmode, mountpoint, maxclients, tlspem, tlskey);
    }

    pub fn broadcast_config(&self) -> CliResult<BroadcastConfig> {
        let caster = match self.ntripmode {
            0 => None,
            1 => {
                if self.mountpoint.trim().is_empty() {
                    return Err(CliError::config("caster mode needs a mountpoint"));
                }
                Some(CasterConfig::new(self.mountpoint.trim()).with_credentials(self.credentials.credentials()))
            }
            other => {
                return Err(CliError::config(format!(
                    "ntripmode must be 0 or 1, got {other}"
                )));
            }
        };
        let default_port = if caster.is_some() {
            gnssrelay_protocol::DEFAULT_PORT
        } else {
            BroadcastConfig::default().port
        };
        if self.maxclients == 0 {
            return Err(CliError::config("maxclients must be at least 1"));
        }
        let tls = self.tlspem.as_ref().map(|pem| TlsPaths {
            cert: pem.clone(),
            key: self.tlskey.clone(),
        });
        if tls.is_none() && self.tlskey.is_some() {
            return Err(CliError::config("tlskey requires tlspem"));
        }
        Ok(BroadcastConfig::new(self.hostip.clone(), self.outport.unwrap_or(default_port))
            .with_max_clients(self.maxclients)
            .with_caster(caster)
            .with_tls(tls))
    }
}

/// `ntrip` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NtripSettings {
    pub server: Option<String>,
    /// Defaults to 2101, or 443 with https.
    pub port: Option<u16>,
    pub https: bool,
    pub mountpoint: String,
    pub ntripversion: String,
    pub datatype: String,
    #[serde(flatten)]
    pub credentials: CredentialSettings,
    #[serde(flatten)]
    pub gga: GgaFileSettings,
    pub retries: u32,
    /// Seconds.
    pub retryinterval: u64,
    /// Seconds.
    pub timeout: u64,
    /// Format bits for corrections written to the output.
    pub format: u32,
    #[serde(flatten)]
    pub output: OutputSettings,
    /// Overrides server, port, https and mountpoint.
    #[serde(skip)]
    pub url: Option<String>,
}

impl Default for NtripSettings {
    fn default() -> Self {
        Self {
            server: None,
            port: None,
            https: false,
            mountpoint: String::new(),
            ntripversion: NtripVersion::default().as_str().to_string(),
            datatype: "RTCM".to_string(),
            credentials: CredentialSettings::default(),
            gga: GgaFileSettings::default(),
            retries: RetryPolicy::default().max_retries,
            retryinterval: RetryPolicy::default().interval.as_secs(),
            timeout: 10,
            format: FormatSpec::PARSED.bits(),
            output: OutputSettings::default(),
            url: None,
        }
    }
}

impl NtripSettings {
    pub fn merge(&mut self, args: &NtripArgs) {
        merge!(self, args; url, server, port, https, mountpoint, ntripversion, datatype, retries, retryinterval, timeout);
        self.credentials.merge(&args.credentials);
        self.gga.merge(&args.gga);
        self.output.merge(&args.output);
    }

    pub fn client_config(&self) -> CliResult<NtripClientConfig> {
        let mut config = match &self.url {
            Some(url) => NtripClientConfig::from_url(url)?,
            None => {
                let server = self
                    .server
                    .as_deref()
                    .ok_or_else(|| CliError::config("a caster URL or --server is required"))?;
                let port = self.port.unwrap_or(if self.https {
                    gnssrelay_ntrip::DEFAULT_TLS_PORT
                } else {
                    gnssrelay_protocol::DEFAULT_PORT
                });
                NtripClientConfig::new(server, port)
                    .with_https(self.https)
                    .with_mountpoint(self.mountpoint.trim())
            }
        };
        if config.credentials.is_none() {
            config = config.with_credentials(Some(self.credentials.client_credentials()));
        }
        let version = self.ntripversion.parse::<NtripVersion>().map_err(CliError::Config)?;
        let retry = RetryPolicy::new(self.retries, Duration::from_secs(self.retryinterval));
        let config = config
            .with_version(version)
            .with_datatype(parse_datatype(&self.datatype)?)
            .with_retry(retry)
            .with_inactivity_timeout(Duration::from_secs(self.timeout.max(1)));
        self.gga.configure(config)
    }
}

/// Resolve `cliinput` together with the GGA settings it may need.
pub fn aux_input(
    input: &InputSettings,
    credentials: &CredentialSettings,
    gga: &GgaFileSettings,
) -> CliResult<Option<AuxInput>> {
    let aux = AuxInput::from_cliinput(
        input.cliinput,
        input.input.as_deref(),
        Some(credentials.client_credentials()),
    )?;
    Ok(match aux {
        Some(AuxInput::Ntrip(config)) => Some(AuxInput::Ntrip(gga.configure(config)?)),
        other => other,
    })
}

fn parse_datatype(value: &str) -> CliResult<ProtocolTag> {
    match value.trim().to_ascii_uppercase().as_str() {
        "RTCM" | "RTCM3" => Ok(ProtocolTag::Rtcm3),
        "SPARTN" => Ok(ProtocolTag::Spartn),
        other => Err(CliError::config(format!(
            "datatype must be RTCM or SPARTN, got '{other}'"
        ))),
    }
}

fn seconds(value: f64, name: &str) -> CliResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| CliError::config(format!("{name} must be a non-negative number of seconds")))
}
