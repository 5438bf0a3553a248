//! Single-mountpoint NTRIP caster handshake.
//!
//! Runs on a freshly accepted connection before it joins the broadcast live
//! set. Only a valid `GET /<mountpoint>` with matching credentials is
//! admitted; every other request gets an error or a sourcetable and is
//! closed.

use std::time::Duration;

use chrono::Utc;
use gnssrelay_ntrip::{LivePosition, PositionSource};
use gnssrelay_protocol::{
    CasterRequest, NtripVersion, SourceTable, SourceTableEntry, Status, check_head,
    error_response, sourcetable_response, stream_response,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::CasterConfig;
use crate::error::StreamResult;

const STREAM_FORMAT: &str = "RTCM 3.3";
const FORMAT_DETAILS: &str = "1005(5),1077(1),1087(1),1097(1),1127(1),1230(1)";
const NAV_SYSTEM: &str = "GPS+GLO+GAL+BEI";
const NETWORK: &str = "gnssrelay";

/// Read one request and answer it. Returns the client's NTRIP version when
/// the connection should start relaying, `None` when it has been answered
/// and should be closed.
pub async fn handshake<S>(
    stream: &mut S,
    caster: &CasterConfig,
    position: Option<&LivePosition>,
    server_addr: &str,
    limit: Duration,
) -> StreamResult<Option<NtripVersion>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let now = Utc::now;

    let head = match timeout(limit, read_head(stream)).await {
        Ok(Ok(Some(head))) => head,
        Ok(Ok(None)) => return Ok(None),
        Ok(Err(e)) => {
            debug!(error = %e, "Rejecting malformed request");
            refuse(stream, &error_response(Status::BadRequest, &caster.mountpoint, now())).await?;
            return Ok(None);
        }
        Err(_) => {
            debug!("Client sent no request in time");
            refuse(stream, &error_response(Status::RequestTimeout, &caster.mountpoint, now())).await?;
            return Ok(None);
        }
    };

    let request = match CasterRequest::parse(&head) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Rejecting malformed request");
            refuse(stream, &error_response(Status::BadRequest, &caster.mountpoint, now())).await?;
            return Ok(None);
        }
    };

    if request.method != "GET" {
        refuse(stream, &error_response(Status::MethodNotAllowed, &caster.mountpoint, now())).await?;
        return Ok(None);
    }

    if let Some(expected) = &caster.credentials
        && request.credentials.as_ref() != Some(expected)
    {
        warn!(path = %request.path, "Rejecting client with bad credentials");
        refuse(stream, &error_response(Status::Unauthorized, &caster.mountpoint, now())).await?;
        return Ok(None);
    }

    if request.mountpoint.is_empty() {
        let body = sourcetable(caster, position, server_addr);
        refuse(stream, &sourcetable_response(request.ntrip_version, &body, now())).await?;
        debug!("Sent sourcetable");
        return Ok(None);
    }

    if request.mountpoint != caster.mountpoint {
        info!(mountpoint = %request.mountpoint, "Unknown mountpoint requested");
        refuse(stream, &error_response(Status::NotFound, &caster.mountpoint, now())).await?;
        return Ok(None);
    }

    reply(stream, &stream_response(request.ntrip_version, now())).await?;
    Ok(Some(request.ntrip_version))
}

/// Read up to the end of the header block. `Ok(None)` if the client hung up
/// first.
async fn read_head<S>(stream: &mut S) -> StreamResult<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(len) = check_head(&buf)? {
            buf.truncate(len);
            return Ok(Some(buf));
        }
        let n = stream.read(&mut chunk).await.map_err(crate::error::StreamError::SourceIo)?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Send a response and keep the connection open for relaying.
async fn reply<S>(stream: &mut S, response: &[u8]) -> StreamResult<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(response)
        .await
        .map_err(crate::error::StreamError::SourceIo)?;
    stream.flush().await.map_err(crate::error::StreamError::SourceIo)
}

/// Send a final response and close the write side.
async fn refuse<S>(stream: &mut S, response: &[u8]) -> StreamResult<()>
where
    S: AsyncWrite + Unpin,
{
    reply(stream, response).await?;
    let _ = stream.shutdown().await;
    Ok(())
}

/// Sourcetable advertising the served mountpoint at the current position.
pub fn sourcetable(caster: &CasterConfig, position: Option<&LivePosition>, server_addr: &str) -> String {
    let (lat, lon) = position
        .and_then(|live| live.position())
        .map_or(("0.00".to_string(), "0.00".to_string()), |p| {
            (format!("{:.2}", p.lat), format!("{:.2}", p.lon))
        });
    let authentication = if caster.credentials.is_some() { "B" } else { "N" };

    let fields = [
        caster.mountpoint.as_str(),
        caster.mountpoint.as_str(),
        STREAM_FORMAT,
        FORMAT_DETAILS,
        "2",
        NAV_SYSTEM,
        NETWORK,
        "",
        lat.as_str(),
        lon.as_str(),
        "0",
        "0",
        "gnssrelay",
        "none",
        authentication,
        "N",
        "0",
        "",
    ];
    let table = SourceTable::from_entries(SourceTableEntry::from_fields(&fields).into_iter().collect());
    let net = format!("NET;{NETWORK};{NETWORK};{authentication};N;none;{server_addr};none;;");
    table.render(&[net])
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnssrelay_protocol::{Credentials, GgaPosition};
    use tokio::io::duplex;

    async fn exchange(
        caster: &CasterConfig,
        request: &str,
    ) -> (Option<NtripVersion>, String) {
        let (mut server, mut client) = duplex(8192);
        client.write_all(request.as_bytes()).await.unwrap();
        let outcome = handshake(
            &mut server,
            caster,
            None,
            "127.0.0.1:2101",
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        drop(server);
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        (outcome, response)
    }

    fn caster() -> CasterConfig {
        CasterConfig::new("RELAY1")
            .with_credentials(Some(Credentials::new("anon", "password")))
    }

    fn authorized(path: &str, version: &str) -> String {
        format!(
            "GET {path} HTTP/1.1\r\nNtrip-Version: {version}\r\nAuthorization: {}\r\n\r\n",
            Credentials::new("anon", "password").header_value()
        )
    }

    #[tokio::test]
    async fn admits_v2_client() {
        let (outcome, response) = exchange(&caster(), &authorized("/RELAY1", "Ntrip/2.0")).await;
        assert_eq!(outcome, Some(NtripVersion::V2));
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Type: gnss/data"));
    }

    #[tokio::test]
    async fn admits_v1_client() {
        let (outcome, response) = exchange(&caster(), &authorized("/RELAY1", "Ntrip/1.0")).await;
        assert_eq!(outcome, Some(NtripVersion::V1));
        assert_eq!(response, "ICY 200 OK\r\n\r\n");
    }

    #[tokio::test]
    async fn admitted_connection_stays_open_for_relay() {
        let (mut server, mut client) = duplex(8192);
        client
            .write_all(authorized("/RELAY1", "Ntrip/1.0").as_bytes())
            .await
            .unwrap();
        let outcome = handshake(
            &mut server,
            &caster(),
            None,
            "127.0.0.1:2101",
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(outcome, Some(NtripVersion::V1));

        server.write_all(b"\xd3\x00\x00").await.unwrap();
        drop(server);
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"ICY 200 OK\r\n\r\n\xd3\x00\x00");
    }

    #[tokio::test]
    async fn wrong_mountpoint_is_not_found() {
        let (outcome, response) = exchange(&caster(), &authorized("/WRONGMOUNT", "Ntrip/2.0")).await;
        assert_eq!(outcome, None);
        assert!(response.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn bad_credentials_are_challenged() {
        let request = "GET /RELAY1 HTTP/1.1\r\nNtrip-Version: Ntrip/2.0\r\n\r\n";
        let (outcome, response) = exchange(&caster(), request).await;
        assert_eq!(outcome, None);
        assert!(response.starts_with("HTTP/1.1 401"));
        assert!(response.contains("WWW-Authenticate: Basic realm=\"RELAY1\""));
    }

    #[tokio::test]
    async fn open_caster_admits_anyone() {
        let open = CasterConfig::new("RELAY1");
        let request = "GET /RELAY1 HTTP/1.1\r\nNtrip-Version: Ntrip/2.0\r\n\r\n";
        let (outcome, _) = exchange(&open, request).await;
        assert_eq!(outcome, Some(NtripVersion::V2));
    }

    #[tokio::test]
    async fn root_returns_sourcetable() {
        let (outcome, response) = exchange(&caster(), &authorized("/", "Ntrip/2.0")).await;
        assert_eq!(outcome, None);
        assert!(response.contains("Content-Type: gnss/sourcetable"));
        assert!(response.contains("STR;RELAY1;RELAY1;RTCM 3.3;"));
        assert!(response.contains("NET;gnssrelay;gnssrelay;B;N;none;127.0.0.1:2101;"));
        assert!(response.ends_with("ENDSOURCETABLE\r\n"));
    }

    #[tokio::test]
    async fn malformed_request_is_bad_request() {
        let (outcome, response) = exchange(&caster(), "HELLO\r\n\r\n").await;
        assert_eq!(outcome, None);
        assert!(response.starts_with("HTTP/1.1 400"));
    }

    #[test]
    fn sourcetable_uses_live_position() {
        let position = LivePosition::new();
        position.set(GgaPosition::new(53.456, -2.25));
        let table = sourcetable(&CasterConfig::new("MP"), Some(&position), "[::1]:2101");
        assert!(table.contains(";53.46;-2.25;"), "{table}");
        assert!(table.contains("NET;gnssrelay;gnssrelay;N;N;none;[::1]:2101;"));
    }
}
