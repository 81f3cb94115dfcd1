#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use padrelay_config::{HostPort, RelayConfig};
use padrelay_relay::{Listener, ReportLock};
use padrelay_tls::LENGTH_HIDING_ALPN;
use padrelay_tls::length_hiding::{UNIT_HEADER_LEN, encode_units};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use socket2::SockRef;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::{TlsAcceptor, TlsConnector, client, server};
use tokio_util::sync::CancellationToken;

#[ctor::ctor]
fn init_crypto() {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install aws-lc-rs crypto provider");
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
}

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Test PKI
// ============================================================================

/// A throwaway CA plus a directory of PEM files it issued.
pub struct Pki {
    dir: tempfile::TempDir,
    ca_cert: rcgen::Certificate,
    ca_key: KeyPair,
}

pub struct Issued {
    pub cert_path: String,
    pub key_path: String,
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl Pki {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, "padrelay test ca");
        let ca_cert = params.self_signed(&ca_key).unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ca.pem"), ca_cert.pem()).unwrap();
        Self {
            dir,
            ca_cert,
            ca_key,
        }
    }

    pub fn ca_path(&self) -> String {
        self.dir.path().join("ca.pem").display().to_string()
    }

    /// Issue a leaf for localhost / 127.0.0.1 with common name `name`.
    pub fn issue(&self, name: &str) -> Issued {
        let key = KeyPair::generate().unwrap();
        let mut params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])
                .unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key).unwrap();

        let cert_path = self.dir.path().join(format!("{name}.pem"));
        let key_path = self.dir.path().join(format!("{name}.key"));
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key.serialize_pem()).unwrap();

        Issued {
            cert_path: cert_path.display().to_string(),
            key_path: key_path.display().to_string(),
            chain: vec![cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der())),
        }
    }

    fn roots(&self) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca_cert.der().clone()).unwrap();
        roots
    }

    /// A TLS client trusting this CA, optionally presenting a certificate.
    pub fn client(&self, identity: Option<Issued>, length_hiding: bool) -> TlsConnector {
        let builder = ClientConfig::builder().with_root_certificates(self.roots());
        let mut config = match identity {
            Some(id) => builder.with_client_auth_cert(id.chain, id.key).unwrap(),
            None => builder.with_no_client_auth(),
        };
        if length_hiding {
            config.alpn_protocols = vec![LENGTH_HIDING_ALPN.to_vec()];
        }
        TlsConnector::from(Arc::new(config))
    }

    fn server(&self, name: &str, length_hiding: bool) -> TlsAcceptor {
        let id = self.issue(name);
        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(id.chain, id.key)
            .unwrap();
        if length_hiding {
            config.alpn_protocols = vec![LENGTH_HIDING_ALPN.to_vec()];
        }
        TlsAcceptor::from(Arc::new(config))
    }
}

pub async fn connect_client(
    connector: &TlsConnector,
    addr: SocketAddr,
) -> std::io::Result<client::TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    let name = ServerName::try_from("localhost").unwrap();
    connector.connect(name, tcp).await
}

/// Read until end of stream or error; true when the peer went away.
pub async fn wait_for_close<S: AsyncRead + Unpin>(stream: &mut S) -> bool {
    let mut buf = [0u8; 256];
    let result = tokio::time::timeout(IO_TIMEOUT, async {
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => continue,
            }
        }
    })
    .await;
    result.is_ok()
}

// ============================================================================
// Destination servers
// ============================================================================

/// What a destination saw on one connection.
#[derive(Debug, Default)]
pub struct Received {
    pub data: Vec<u8>,
    /// `payload + padding` of each unit, when length hiding was negotiated.
    pub unit_lengths: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
pub enum Mode {
    /// Echo every chunk; a chunk starting with `RESET` resets the connection.
    Echo,
    /// Record `expect` payload bytes, report them, reply `ok` and close.
    Record { expect: usize },
    /// After the first chunk, send `bytes` bytes without reading, then close.
    Download { bytes: usize },
}

pub struct Destination {
    pub addr: SocketAddr,
    pub received: mpsc::UnboundedReceiver<Received>,
    accepted: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl Destination {
    pub async fn start(pki: &Pki, mode: Mode, length_hiding: bool) -> Self {
        let acceptor = pki.server("destination", length_hiding);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        let (tx, received) = mpsc::unbounded_channel();

        let counter = accepted.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let (tcp, _) = tokio::select! {
                    _ = token.cancelled() => return,
                    r = listener.accept() => match r {
                        Ok(v) => v,
                        Err(_) => return,
                    },
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let acceptor = acceptor.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let Ok(tls) = acceptor.accept(tcp).await else {
                        return;
                    };
                    match mode {
                        Mode::Echo => echo(tls).await,
                        Mode::Record { expect } => record(tls, expect, tx).await,
                        Mode::Download { bytes } => download(tls, bytes).await,
                    }
                });
            }
        });

        Self {
            addr,
            received,
            accepted,
            shutdown,
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn address(&self) -> HostPort {
        HostPort::parse(&self.addr.to_string()).unwrap()
    }
}

impl Drop for Destination {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn echo(mut tls: server::TlsStream<TcpStream>) {
    let mut buf = [0u8; 4096];
    loop {
        let n = match tls.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if buf[..n].starts_with(b"RESET") {
            let _ = SockRef::from(tls.get_ref().0).set_linger(Some(Duration::ZERO));
            drop(tls);
            return;
        }
        if tls.write_all(&buf[..n]).await.is_err() {
            break;
        }
    }
    let _ = tls.shutdown().await;
}

async fn download(mut tls: server::TlsStream<TcpStream>, bytes: usize) {
    let mut buf = [0u8; 4096];
    if !matches!(tls.read(&mut buf).await, Ok(n) if n > 0) {
        return;
    }
    let chunk = vec![0x5a; 16 * 1024];
    let mut sent = 0;
    while sent < bytes {
        if tls.write_all(&chunk).await.is_err() {
            return;
        }
        sent += chunk.len();
    }
    let _ = tls.shutdown().await;
}

async fn record(
    mut tls: server::TlsStream<TcpStream>,
    expect: usize,
    tx: mpsc::UnboundedSender<Received>,
) {
    let length_hiding = tls.get_ref().1.alpn_protocol() == Some(LENGTH_HIDING_ALPN);
    let mut received = Received::default();

    while received.data.len() < expect {
        if length_hiding {
            let mut header = [0u8; UNIT_HEADER_LEN];
            if tls.read_exact(&mut header).await.is_err() {
                break;
            }
            let payload = u16::from_be_bytes([header[0], header[1]]) as usize;
            let padding = u16::from_be_bytes([header[2], header[3]]) as usize;
            let mut body = vec![0u8; payload + padding];
            if tls.read_exact(&mut body).await.is_err() {
                break;
            }
            received.unit_lengths.push(payload + padding);
            received.data.extend_from_slice(&body[..payload]);
        } else {
            let mut buf = [0u8; 4096];
            match tls.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => received.data.extend_from_slice(&buf[..n]),
            }
        }
    }
    let _ = tx.send(received);

    let reply = if length_hiding {
        let mut out = BytesMut::new();
        encode_units(b"ok", 2, &mut out);
        out.to_vec()
    } else {
        b"ok".to_vec()
    };
    let _ = tls.write_all(&reply).await;
    let _ = tls.shutdown().await;
}

// ============================================================================
// Relays
// ============================================================================

/// Relay towards `dest` presenting a certificate issued by `pki`, trusting
/// `pki` for the destination.
pub fn relay_config(pki: &Pki, dest: HostPort) -> RelayConfig {
    static RELAYS: AtomicUsize = AtomicUsize::new(0);
    let id = pki.issue(&format!("relay-{}", RELAYS.fetch_add(1, Ordering::SeqCst)));
    let mut cfg = RelayConfig::new(HostPort::parse("127.0.0.1:0").unwrap(), dest);
    cfg.server_name_indicator = Some("localhost".into());
    cfg.as_server.cert = Some(id.cert_path);
    cfg.as_server.key = Some(id.key_path);
    cfg.as_client.ca = Some(pki.ca_path());
    cfg
}

pub struct RunningListener {
    pub addr: SocketAddr,
    pub token: CancellationToken,
}

impl Drop for RunningListener {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub async fn start_relay(name: &str, cfg: RelayConfig) -> RunningListener {
    let listener = Listener::bind(name, cfg, ReportLock::default())
        .await
        .unwrap();
    let addr = listener.local_addr();
    let token = CancellationToken::new();
    tokio::spawn(listener.serve(token.clone()));
    RunningListener { addr, token }
}
