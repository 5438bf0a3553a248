//! Outbound caster connections over plain TCP or TLS.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::NtripClientConfig;
use crate::error::{NtripError, NtripResult};

/// A bidirectional byte stream to a caster.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

pub type BoxedTransport = Box<dyn Transport>;

/// Open a connection to the configured caster, bounded by the connect
/// timeout (TLS handshake included).
pub async fn connect(config: &NtripClientConfig) -> NtripResult<BoxedTransport> {
    let address = config.address();
    let stream = timeout(
        config.connect_timeout,
        TcpStream::connect((config.server.as_str(), config.port)),
    )
    .await
    .map_err(|_| NtripError::timeout(format!("connecting to {address}")))?
    .map_err(|e| NtripError::connection(format!("connecting to {address}: {e}")).with_source(e))?;
    stream.set_nodelay(true)?;
    debug!(address = %address, https = config.https, "Connected to caster");

    if config.https {
        return tls::wrap(stream, config).await;
    }
    Ok(Box::new(stream))
}

#[cfg(feature = "tls")]
mod tls {
    use std::sync::Arc;

    use rustls::{ClientConfig, RootCertStore};
    use rustls_pki_types::ServerName;
    use tokio::net::TcpStream;
    use tokio::time::timeout;
    use tokio_rustls::TlsConnector;

    use super::BoxedTransport;
    use crate::config::NtripClientConfig;
    use crate::error::{NtripError, NtripResult};

    fn connector() -> TlsConnector {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }

    pub(super) async fn wrap(
        stream: TcpStream,
        config: &NtripClientConfig,
    ) -> NtripResult<BoxedTransport> {
        let name = ServerName::try_from(config.server.clone())
            .map_err(|e| NtripError::tls(format!("invalid server name '{}': {e}", config.server)))?;
        let stream = timeout(config.connect_timeout, connector().connect(name, stream))
            .await
            .map_err(|_| NtripError::timeout(format!("TLS handshake with {}", config.address())))?
            .map_err(|e| NtripError::tls(format!("TLS handshake failed: {e}")).with_source(e))?;
        Ok(Box::new(stream))
    }
}

#[cfg(not(feature = "tls"))]
mod tls {
    use tokio::net::TcpStream;

    use super::BoxedTransport;
    use crate::config::NtripClientConfig;
    use crate::error::{NtripError, NtripResult};

    pub(super) async fn wrap(
        _stream: TcpStream,
        _config: &NtripClientConfig,
    ) -> NtripResult<BoxedTransport> {
        Err(NtripError::configuration(
            "https casters need the 'tls' feature",
        ))
    }
}
