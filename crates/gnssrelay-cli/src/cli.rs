//! Command-line interface definition.
//!
//! Every option is optional so that values from the config file apply
//! unless overridden here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// gnssrelay - stream, filter and relay GNSS receiver data
#[derive(Debug, Parser)]
#[command(name = "gnssrelay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a configuration file (overrides the per-command variable)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Log verbosity: -1 critical, 0 error, 1 warning, 2 info, 3 debug
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub verbosity: Option<i8>,

    /// Also write logs to this file, rotated daily
    #[arg(long, global = true)]
    pub logtofile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream a receiver to the terminal, a file, a serial port or TCP clients
    Stream(StreamArgs),

    /// Relay a receiver to TCP clients, optionally as an NTRIP caster
    Serve(ServeArgs),

    /// Fetch a sourcetable or a correction stream from an NTRIP caster
    Ntrip(NtripArgs),
}

/// Primary source selection.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// Serial port of the receiver
    #[arg(long)]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    pub baudrate: Option<u32>,

    /// Serial read timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Read from a binary capture file
    #[arg(long)]
    pub filename: Option<PathBuf>,

    /// Read from a TCP socket (host:port)
    #[arg(long)]
    pub socket: Option<String>,
}

/// Decode, filter and format settings.
#[derive(Debug, Clone, Default, Args)]
pub struct ProcessingArgs {
    /// Protocol bitmask: 1 NMEA, 2 UBX, 4 RTCM3, 8 SBF, 16 SPARTN
    #[arg(long)]
    pub protfilter: Option<u32>,

    /// Comma-separated identities, optionally throttled: GNGGA,NAV-PVT(10)
    #[arg(long)]
    pub msgfilter: Option<String>,

    /// Format bitmask: 1 parsed, 2 raw, 4 hex, 8 hex table, 16 string, 32 JSON
    #[arg(long)]
    pub format: Option<u32>,

    /// Malformed frames: 0 ignore, 1 log, 2 stop
    #[arg(long)]
    pub quitonerror: Option<u8>,

    /// Verify checksums and CRCs
    #[arg(long)]
    pub validate: Option<bool>,

    /// Stop after this many messages (0 = unlimited)
    #[arg(long)]
    pub limit: Option<u64>,
}

/// Auxiliary correction input.
#[derive(Debug, Clone, Default, Args)]
pub struct InputArgs {
    /// 0 none, 1 NTRIP RTCM, 2 NTRIP SPARTN, 3 MQTT SPARTN, 4 serial, 5 file
    #[arg(long)]
    pub cliinput: Option<u8>,

    /// Input target: NTRIP URL, port@baud or file path
    #[arg(long)]
    pub input: Option<String>,
}

/// NTRIP credentials.
#[derive(Debug, Clone, Default, Args)]
pub struct CredentialArgs {
    /// NTRIP user
    #[arg(long, env = "GNSSRELAY_NTRIP_USER")]
    pub ntripuser: Option<String>,

    /// NTRIP password
    #[arg(long, env = "GNSSRELAY_NTRIP_PASSWORD", hide_env_values = true)]
    pub ntrippassword: Option<String>,
}

/// GGA feedback to an NTRIP caster.
#[derive(Debug, Clone, Default, Args)]
pub struct GgaArgs {
    /// Seconds between GGA sentences, -1 disables
    #[arg(long, allow_negative_numbers = true)]
    pub ggainterval: Option<i64>,

    /// 0 live position from the receiver, 1 fixed reference position
    #[arg(long)]
    pub ggamode: Option<u8>,

    /// Reference latitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub reflat: Option<f64>,

    /// Reference longitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub reflon: Option<f64>,

    /// Reference height above mean sea level in meters
    #[arg(long, allow_negative_numbers = true)]
    pub refalt: Option<f64>,

    /// Reference geoid separation in meters
    #[arg(long, allow_negative_numbers = true)]
    pub refsep: Option<f64>,
}

/// Output sink selection.
#[derive(Debug, Clone, Default, Args)]
pub struct OutputArgs {
    /// 0 terminal, 1 binary file, 2 serial, 3 TCP, 4 callback, 5 text file
    #[arg(long)]
    pub clioutput: Option<u8>,

    /// Output target: file path, port@baud, host:port or callback name
    #[arg(long)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct StreamArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub processing: ProcessingArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    #[command(flatten)]
    pub gga: GgaArgs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub processing: ProcessingArgs,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    #[command(flatten)]
    pub gga: GgaArgs,

    /// Address to listen on (IPv4 or IPv6)
    #[arg(long)]
    pub hostip: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub outport: Option<u16>,

    /// 0 plain socket server, 1 NTRIP caster
    #[arg(long)]
    pub ntripmode: Option<u8>,

    /// Mountpoint served in caster mode
    #[arg(long)]
    pub mountpoint: Option<String>,

    /// Maximum concurrent clients
    #[arg(long)]
    pub maxclients: Option<usize>,

    /// PEM file holding the TLS certificate chain (and key, unless --tlskey)
    #[arg(long)]
    pub tlspem: Option<PathBuf>,

    /// PEM file holding the TLS private key
    #[arg(long)]
    pub tlskey: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct NtripArgs {
    /// Caster as a URL (http[s]://[user:pass@]host[:port]/MP); overrides
    /// --server, --port, --https and --mountpoint
    pub url: Option<String>,

    /// Caster host
    #[arg(long)]
    pub server: Option<String>,

    /// Caster port
    #[arg(long)]
    pub port: Option<u16>,

    /// Connect over TLS
    #[arg(long)]
    pub https: Option<bool>,

    /// Mountpoint; leave empty for the sourcetable
    #[arg(long)]
    pub mountpoint: Option<String>,

    /// NTRIP version: 1.0 or 2.0
    #[arg(long)]
    pub ntripversion: Option<String>,

    /// Correction data type: RTCM or SPARTN
    #[arg(long)]
    pub datatype: Option<String>,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    #[command(flatten)]
    pub gga: GgaArgs,

    /// Connection attempts before giving up
    #[arg(long)]
    pub retries: Option<u32>,

    /// Seconds to wait before the first retry
    #[arg(long)]
    pub retryinterval: Option<u64>,

    /// Seconds without data before the stream counts as interrupted
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stream_options() {
        let cli = Cli::parse_from([
            "gnssrelay",
            "--verbosity",
            "-1",
            "stream",
            "--port",
            "/dev/ttyACM0",
            "--baudrate",
            "38400",
            "--protfilter",
            "5",
            "--msgfilter",
            "GNGGA,1005(10)",
            "--clioutput",
            "1",
            "--output",
            "capture.bin",
        ]);
        assert_eq!(cli.verbosity, Some(-1));
        let Command::Stream(args) = cli.command else {
            panic!("expected stream");
        };
        assert_eq!(args.source.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(args.processing.protfilter, Some(5));
        assert_eq!(args.output.clioutput, Some(1));
    }

    #[test]
    fn parses_ntrip_url() {
        let cli = Cli::parse_from([
            "gnssrelay",
            "ntrip",
            "https://caster.example.com/MP1",
            "--ggainterval",
            "-1",
        ]);
        let Command::Ntrip(args) = cli.command else {
            panic!("expected ntrip");
        };
        assert_eq!(args.url.as_deref(), Some("https://caster.example.com/MP1"));
        assert_eq!(args.gga.ggainterval, Some(-1));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
