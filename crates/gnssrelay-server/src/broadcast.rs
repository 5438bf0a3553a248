//! TCP fan-out server.
//!
//! Every chunk handed to [`BroadcastHandle::broadcast`] is queued to every
//! live client. Each client has its own writer task and bounded queue, so a
//! slow client only ever stalls itself: a full queue or a write that exceeds
//! the write timeout drops that client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use gnssrelay_ntrip::LivePosition;
use gnssrelay_ntrip::connection::BoxedTransport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::caster;
use crate::config::BroadcastConfig;
use crate::error::{StreamError, StreamResult};
use crate::signals::ShutdownHandle;
use crate::tls::build_acceptor;

/// A relaying client, as registered in the live set.
#[derive(Debug)]
struct ClientConnection {
    remote: SocketAddr,
    connected_at: DateTime<Utc>,
    queue: mpsc::Sender<Bytes>,
}

/// Public view of a live client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSummary {
    pub id: u64,
    pub remote: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// Shared access to the live set.
#[derive(Debug, Clone, Default)]
pub struct BroadcastHandle {
    live: Arc<Mutex<HashMap<u64, ClientConnection>>>,
    next_id: Arc<AtomicU64>,
}

impl BroadcastHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, ClientConnection>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, remote: SocketAddr, queue: mpsc::Sender<Bytes>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock().insert(
            id,
            ClientConnection {
                remote,
                connected_at: Utc::now(),
                queue,
            },
        );
        id
    }

    fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Queue `chunk` to every live client; returns how many accepted it.
    /// Clients whose queue is full are dropped as stalled.
    pub fn broadcast(&self, chunk: Bytes) -> usize {
        let mut live = self.lock();
        live.retain(|id, client| match client.queue.try_send(chunk.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(client = id, remote = %client.remote, "Client stalled, dropping");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
        live.len()
    }

    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    pub fn clients(&self) -> Vec<ClientSummary> {
        let mut clients: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, client)| ClientSummary {
                id: *id,
                remote: client.remote,
                connected_at: client.connected_at,
            })
            .collect();
        clients.sort_by_key(|c| c.id);
        clients
    }

    /// Drop every client; writer tasks flush what is queued and exit.
    pub fn disconnect_all(&self) {
        self.lock().clear();
    }
}

struct ClientContext {
    config: BroadcastConfig,
    acceptor: Option<TlsAcceptor>,
    handle: BroadcastHandle,
    position: Option<LivePosition>,
    local_addr: SocketAddr,
}

/// A bound broadcast server.
pub struct BroadcastServer {
    listener: TcpListener,
    context: Arc<ClientContext>,
    slots: Arc<Semaphore>,
}

impl BroadcastServer {
    /// Bind the listening socket; fails with [`StreamError::Bind`] if the
    /// address is unavailable.
    pub async fn bind(config: BroadcastConfig) -> StreamResult<Self> {
        let acceptor = config.tls.as_ref().map(build_acceptor).transpose()?;
        let address = config.address();
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| StreamError::bind(&address, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| StreamError::bind(&address, e))?;
        info!(
            address = %local_addr,
            tls = acceptor.is_some(),
            caster = config.caster.is_some(),
            max_clients = config.max_clients,
            "Broadcast server listening"
        );

        let slots = Arc::new(Semaphore::new(config.max_clients));
        Ok(Self {
            listener,
            context: Arc::new(ClientContext {
                config,
                acceptor,
                handle: BroadcastHandle::default(),
                position: None,
                local_addr,
            }),
            slots,
        })
    }

    /// Position advertised in the caster sourcetable.
    #[must_use]
    pub fn with_position(mut self, position: LivePosition) -> Self {
        if let Some(context) = Arc::get_mut(&mut self.context) {
            context.position = Some(position);
        }
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.context.local_addr
    }

    pub fn handle(&self) -> BroadcastHandle {
        self.context.handle.clone()
    }

    /// Accept clients until `shutdown` fires, then drop them all.
    pub async fn run(self, shutdown: ShutdownHandle) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                        warn!(
                            remote = %remote,
                            max_clients = self.context.config.max_clients,
                            "Client limit reached, refusing connection"
                        );
                        drop(stream);
                        continue;
                    };
                    let context = Arc::clone(&self.context);
                    tasks.spawn(async move {
                        serve_client(stream, remote, context).await;
                        drop(permit);
                    });
                }
                _ = shutdown.wait().wait() => break,
            }
            while tasks.try_join_next().is_some() {}
        }

        self.context.handle.disconnect_all();
        let write_timeout = self.context.config.write_timeout;
        if timeout(write_timeout, async { while tasks.join_next().await.is_some() {} })
            .await
            .is_err()
        {
            tasks.abort_all();
        }
        info!(address = %self.context.local_addr, "Broadcast server stopped");
    }
}

async fn serve_client(stream: TcpStream, remote: SocketAddr, context: Arc<ClientContext>) {
    let _ = stream.set_nodelay(true);
    let mut stream: BoxedTransport = match &context.acceptor {
        Some(acceptor) => {
            match timeout(context.config.handshake_timeout, acceptor.accept(stream)).await {
                Ok(Ok(tls)) => Box::new(tls),
                Ok(Err(e)) => {
                    warn!(remote = %remote, error = %e, "TLS handshake failed");
                    return;
                }
                Err(_) => {
                    warn!(remote = %remote, "TLS handshake timed out");
                    return;
                }
            }
        }
        None => Box::new(stream),
    };

    if let Some(caster) = &context.config.caster {
        let server_addr = context.local_addr.to_string();
        let outcome = caster::handshake(
            &mut stream,
            caster,
            context.position.as_ref(),
            &server_addr,
            context.config.handshake_timeout,
        )
        .await;
        match outcome {
            Ok(Some(version)) => debug!(remote = %remote, version = %version, "NTRIP client accepted"),
            Ok(None) => return,
            Err(e) => {
                warn!(remote = %remote, error = %e, "NTRIP handshake failed");
                return;
            }
        }
    }

    let (tx, rx) = mpsc::channel(context.config.queue_capacity.max(1));
    let id = context.handle.register(remote, tx);
    info!(client = id, remote = %remote, "Client connected");

    let reason = relay(stream, rx, &context.config).await;

    context.handle.remove(id);
    info!(client = id, remote = %remote, reason, "Client disconnected");
}

/// Write queued chunks until the queue closes, a write stalls or fails, or
/// the client hangs up. Returns why it stopped.
async fn relay(
    stream: BoxedTransport,
    mut queue: mpsc::Receiver<Bytes>,
    config: &BroadcastConfig,
) -> &'static str {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut scratch = [0u8; 512];

    loop {
        tokio::select! {
            chunk = queue.recv() => {
                let Some(chunk) = chunk else {
                    let _ = timeout(config.write_timeout, writer.shutdown()).await;
                    return "server closed";
                };
                match timeout(config.write_timeout, writer.write_all(&chunk)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => return "write failed",
                    Err(_) => return "write timed out",
                }
            }
            read = reader.read(&mut scratch) => {
                match read {
                    Ok(0) | Err(_) => return "client closed",
                    Ok(_) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn server(config: BroadcastConfig) -> (SocketAddr, BroadcastHandle, ShutdownHandle) {
        let server = BroadcastServer::bind(config).await.unwrap();
        let addr = server.local_addr();
        let handle = server.handle();
        let shutdown = ShutdownHandle::new();
        tokio::spawn(server.run(shutdown.clone()));
        (addr, handle, shutdown)
    }

    async fn wait_for_clients(handle: &BroadcastHandle, count: usize) {
        timeout(Duration::from_secs(5), async {
            while handle.client_count() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn fans_out_to_every_client() {
        let (addr, handle, shutdown) = server(BroadcastConfig::new("127.0.0.1", 0)).await;
        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();
        wait_for_clients(&handle, 2).await;

        assert_eq!(handle.broadcast(Bytes::from_static(b"\xd3\x00\x13")), 2);
        for client in [&mut a, &mut b] {
            let mut buf = [0u8; 3];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"\xd3\x00\x13");
        }

        let ids: Vec<_> = handle.clients().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
        shutdown.trigger();
    }

    #[tokio::test]
    async fn bind_conflict_is_bind_error() {
        let first = BroadcastServer::bind(BroadcastConfig::new("127.0.0.1", 0))
            .await
            .unwrap();
        let port = first.local_addr().port();
        let err = BroadcastServer::bind(BroadcastConfig::new("127.0.0.1", port))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Bind { .. }));
    }

    #[tokio::test]
    async fn refuses_clients_beyond_limit() {
        let config = BroadcastConfig::new("127.0.0.1", 0).with_max_clients(1);
        let (addr, handle, shutdown) = server(config).await;

        let _first = TcpStream::connect(addr).await.unwrap();
        wait_for_clients(&handle, 1).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        let read = timeout(Duration::from_secs(2), second.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(handle.client_count(), 1);
        shutdown.trigger();
    }

    #[tokio::test]
    async fn caster_rejects_unknown_mountpoint() {
        let config = BroadcastConfig::new("127.0.0.1", 0)
            .with_caster(Some(crate::config::CasterConfig::new("RELAY1")));
        let (addr, handle, shutdown) = server(config).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /WRONGMOUNT HTTP/1.1\r\nNtrip-Version: Ntrip/2.0\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        timeout(Duration::from_secs(2), client.read_to_string(&mut response))
            .await
            .unwrap()
            .unwrap();

        assert!(response.starts_with("HTTP/1.1 404"));
        assert_eq!(handle.broadcast(Bytes::from_static(b"data")), 0);
        assert_eq!(handle.client_count(), 0);
        shutdown.trigger();
    }

    #[tokio::test]
    async fn caster_relays_after_handshake() {
        let config = BroadcastConfig::new("127.0.0.1", 0)
            .with_caster(Some(crate::config::CasterConfig::new("RELAY1")));
        let (addr, handle, shutdown) = server(config).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /RELAY1 HTTP/1.0\r\nUser-Agent: NTRIP test\r\n\r\n")
            .await
            .unwrap();
        let mut status = [0u8; 14];
        client.read_exact(&mut status).await.unwrap();
        assert_eq!(&status, b"ICY 200 OK\r\n\r\n");

        wait_for_clients(&handle, 1).await;
        handle.broadcast(Bytes::from_static(b"\xd3\x00\x00"));
        let mut frame = [0u8; 3];
        client.read_exact(&mut frame).await.unwrap();
        assert_eq!(&frame, b"\xd3\x00\x00");
        shutdown.trigger();
    }

    fn tls_fixture() -> crate::config::TlsPaths {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        crate::config::TlsPaths {
            cert: dir.join("cert.pem"),
            key: Some(dir.join("key.pem")),
        }
    }

    fn tls_connector(paths: &crate::config::TlsPaths) -> tokio_rustls::TlsConnector {
        use rustls_pki_types::CertificateDer;
        use rustls_pki_types::pem::PemObject;

        let mut roots = rustls::RootCertStore::empty();
        for cert in CertificateDer::pem_file_iter(&paths.cert).unwrap() {
            roots.add(cert.unwrap()).unwrap();
        }
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        tokio_rustls::TlsConnector::from(Arc::new(config))
    }

    #[tokio::test]
    async fn tls_caster_relays_after_handshake() {
        let paths = tls_fixture();
        let config = BroadcastConfig::new("127.0.0.1", 0)
            .with_tls(Some(paths.clone()))
            .with_caster(Some(crate::config::CasterConfig::new("RELAY1")));
        let (addr, handle, shutdown) = server(config).await;

        let tcp = TcpStream::connect(addr).await.unwrap();
        let name = rustls_pki_types::ServerName::try_from("localhost".to_string()).unwrap();
        let mut client = tls_connector(&paths).connect(name, tcp).await.unwrap();
        client
            .write_all(b"GET /RELAY1 HTTP/1.1\r\nNtrip-Version: Ntrip/2.0\r\n\r\n")
            .await
            .unwrap();

        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            client.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        assert!(head.starts_with(b"HTTP/1.1 200 OK\r\n"));

        wait_for_clients(&handle, 1).await;
        handle.broadcast(Bytes::from_static(b"\xd3\x00\x00"));
        let mut frame = [0u8; 3];
        timeout(Duration::from_secs(2), client.read_exact(&mut frame))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&frame, b"\xd3\x00\x00");
        shutdown.trigger();
    }

    #[tokio::test]
    async fn plain_client_on_tls_listener_is_dropped() {
        let config = BroadcastConfig::new("127.0.0.1", 0)
            .with_tls(Some(tls_fixture()))
            .with_handshake_timeout(Duration::from_secs(1));
        let (addr, handle, shutdown) = server(config).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /RELAY1 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        let _ = timeout(Duration::from_secs(3), client.read_to_end(&mut response))
            .await
            .unwrap();

        assert!(!response.starts_with(b"HTTP/1.1 200"));
        assert_eq!(handle.client_count(), 0);
        assert_eq!(handle.broadcast(Bytes::from_static(b"data")), 0);
        shutdown.trigger();
    }

    #[tokio::test]
    async fn disconnects_are_removed() {
        let (addr, handle, shutdown) = server(BroadcastConfig::new("127.0.0.1", 0)).await;
        let client = TcpStream::connect(addr).await.unwrap();
        wait_for_clients(&handle, 1).await;
        drop(client);
        wait_for_clients(&handle, 0).await;
        shutdown.trigger();
    }

    #[tokio::test]
    async fn stalled_client_does_not_block_healthy_one() {
        let config = BroadcastConfig::new("127.0.0.1", 0)
            .with_queue_capacity(16)
            .with_write_timeout(Duration::from_millis(200));
        let (addr, handle, shutdown) = server(config).await;

        let mut healthy = TcpStream::connect(addr).await.unwrap();
        wait_for_clients(&handle, 1).await;
        let _stalled = TcpStream::connect(addr).await.unwrap();
        wait_for_clients(&handle, 2).await;

        let reader = tokio::spawn(async move {
            let mut total = 0usize;
            let mut buf = vec![0u8; 64 * 1024];
            while let Ok(Ok(n)) = timeout(Duration::from_secs(2), healthy.read(&mut buf)).await {
                if n == 0 {
                    break;
                }
                total += n;
            }
            total
        });

        let chunk = Bytes::from(vec![0x55u8; 64 * 1024]);
        let mut sent = 0usize;
        timeout(Duration::from_secs(10), async {
            while handle.client_count() > 1 {
                handle.broadcast(chunk.clone());
                sent += chunk.len();
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(handle.client_count(), 1);
        handle.broadcast(chunk.clone());
        sent += chunk.len();
        shutdown.trigger();
        let received = reader.await.unwrap();
        assert!(received > 0);
        assert!(received <= sent);
    }
}
