//! TLS acceptor for the broadcast server.

use std::sync::Arc;

use rustls::ServerConfig;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::config::TlsPaths;
use crate::error::{StreamError, StreamResult};

/// Build an acceptor from PEM files. A single file may hold both the
/// certificate chain and the key.
pub fn build_acceptor(paths: &TlsPaths) -> StreamResult<TlsAcceptor> {
    let certs = CertificateDer::pem_file_iter(&paths.cert)
        .map_err(|e| {
            StreamError::tls(format!(
                "cannot read certificates from {}: {e}",
                paths.cert.display()
            ))
        })?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            StreamError::tls(format!(
                "invalid certificate in {}: {e}",
                paths.cert.display()
            ))
        })?;
    if certs.is_empty() {
        return Err(StreamError::tls(format!(
            "no certificates found in {}",
            paths.cert.display()
        )));
    }

    let key_path = paths.key_path();
    let key = PrivateKeyDer::from_pem_file(key_path).map_err(|e| {
        StreamError::tls(format!(
            "cannot read private key from {}: {e}",
            key_path.display()
        ))
    })?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| StreamError::tls(format!("invalid certificate/key pair: {e}")))?;
    debug!(cert = %paths.cert.display(), "Loaded TLS certificate");

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_tls_error() {
        let err = build_acceptor(&TlsPaths::combined("/nonexistent/server.pem"))
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Tls { .. }));
    }

    #[test]
    fn file_without_pem_sections_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();
        let err = build_acceptor(&TlsPaths::combined(file.path()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("no certificates"));
    }
}
