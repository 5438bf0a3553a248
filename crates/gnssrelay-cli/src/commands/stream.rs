//! `stream`: read a receiver and write filtered, formatted output to one sink.

use gnssrelay_core::FormatSpec;
use gnssrelay_server::{Counters, Dispatcher, ShutdownHandle, SinkSpec};
use tracing::info;

use crate::callbacks::callback_sink;
use crate::config::{OutputSettings, StreamSettings, aux_input};
use crate::error::CliResult;

pub async fn run(settings: StreamSettings, shutdown: ShutdownHandle) -> CliResult<Counters> {
    let config = settings.processing.to_dispatcher_config(FormatSpec::PARSED)?;
    let source = settings.source.to_options()?;
    let sink = sink_spec(&settings.output)?;
    let inputs = aux_input(&settings.input, &settings.credentials, &settings.gga)?
        .into_iter()
        .collect::<Vec<_>>();

    info!(?sink, inputs = inputs.len(), "Starting stream");
    let dispatcher = Dispatcher::start(config, source, vec![sink], inputs).await?;
    super::run_dispatcher(dispatcher, shutdown).await
}

/// `clioutput` to a sink, resolving named callbacks.
pub(crate) fn sink_spec(output: &OutputSettings) -> CliResult<SinkSpec> {
    let target = output.output.as_deref();
    match output.clioutput {
        4 => Ok(SinkSpec::Callback(callback_sink(target)?)),
        value => Ok(SinkSpec::from_clioutput(value, target)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProcessingSettings, SourceSettings};
    use crate::error::CliError;
    use gnssrelay_server::StreamError;
    use std::io::Write;

    const GGA: &[u8] = b"$GPGGA,123519.00,4807.03800,S,01131.00000,E,2,08,0.9,545.4,M,46.9,M,,*77\r\n";
    const DTM: &[u8] = b"$GNDTM,W84,,0.0,N,0.0,E,0.0,W84*71\r\n";

    fn capture(frames: &[&[u8]]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for frame in frames {
            file.write_all(frame).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn streams_file_to_binary_file() {
        let input = capture(&[GGA, DTM, GGA]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("gga.bin");

        let settings = StreamSettings {
            source: SourceSettings {
                filename: Some(input.path().to_path_buf()),
                ..SourceSettings::default()
            },
            processing: ProcessingSettings {
                msgfilter: Some("GPGGA".into()),
                format: Some(2),
                ..ProcessingSettings::default()
            },
            output: OutputSettings {
                clioutput: 1,
                output: Some(out.display().to_string()),
            },
            ..StreamSettings::default()
        };

        let counters = run(settings, ShutdownHandle::new()).await.unwrap();
        assert_eq!(counters.input_total(), 3);
        assert_eq!(counters.output_total(), 2);

        let written = std::fs::read(&out).unwrap();
        assert_eq!(written, [GGA, GGA].concat());
    }

    #[tokio::test]
    async fn two_sources_are_rejected() {
        let input = capture(&[GGA]);
        let settings = StreamSettings {
            source: SourceSettings {
                filename: Some(input.path().to_path_buf()),
                socket: Some("localhost:50010".into()),
                ..SourceSettings::default()
            },
            ..StreamSettings::default()
        };
        let err = run(settings, ShutdownHandle::new()).await.unwrap_err();
        assert!(matches!(err, CliError::Stream(StreamError::Config { .. })));
        assert_eq!(err.exit_status(), 1);
    }

    #[test]
    fn callback_output_resolves_by_name() {
        let output = OutputSettings {
            clioutput: 4,
            output: Some("json-lines".into()),
        };
        assert!(matches!(sink_spec(&output), Ok(SinkSpec::Callback(_))));
    }
}
