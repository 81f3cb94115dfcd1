//! TLS contexts for both relay roles.
//!
//! Handshakes only check handshake signatures. Identity is checked in a
//! separate step, [`ServerTlsContext::verify_client`] /
//! [`ClientTlsContext::verify_server`], so a relay can choose per connection
//! whether and when to authenticate its peers.

use std::sync::Arc;

use padrelay_config::TlsSideConfig;
use rustls::SupportedProtocolVersion;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::ServerCertVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::server::danger::ClientCertVerifier;
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{info, warn};

use crate::certs::{
    generate_self_signed, load_certs, load_private_key, load_root_store, webpki_root_store,
};
use crate::endpoint::Endpoint;
use crate::error::TlsError;
use crate::length_hiding::LENGTH_HIDING_ALPN;
use crate::session::{FarSession, NearSession, Session};
use crate::verify::{DeferredClientVerifier, DeferredServerVerifier};

/// Server-role context, used towards the origin.
#[derive(Clone)]
pub struct ServerTlsContext {
    acceptor: TlsAcceptor,
    client_verifier: Option<Arc<dyn ClientCertVerifier>>,
}

impl ServerTlsContext {
    /// Build from config. Generates an ephemeral self-signed certificate when
    /// none is configured. With `verify_client` the handshake requests a
    /// client certificate, checked later against `cfg.ca`.
    pub fn new(
        cfg: &TlsSideConfig,
        verify_client: bool,
        length_hiding: bool,
    ) -> Result<Self, TlsError> {
        let provider = crypto_provider(cfg)?;
        let (certs, key) = match (&cfg.cert, &cfg.key) {
            (Some(cert), Some(key)) => (load_certs(cert)?, load_private_key(key)?),
            _ => generate_self_signed()?,
        };

        let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(protocol_versions(cfg))?;

        let (builder, client_verifier) = if verify_client {
            let ca = cfg.ca.as_deref().ok_or_else(|| {
                TlsError::Config("client verification requires a CA file".into())
            })?;
            let roots = Arc::new(load_root_store(ca)?);
            let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider.clone())
                .build()?;
            let deferred = Arc::new(DeferredClientVerifier::new(provider.clone()));
            (builder.with_client_cert_verifier(deferred), Some(verifier))
        } else {
            (builder.with_no_client_auth(), None)
        };

        let mut config = builder.with_single_cert(certs, key)?;
        if length_hiding {
            config.alpn_protocols = vec![LENGTH_HIDING_ALPN.to_vec()];
        }

        info!(
            role = "server",
            min_version = %cfg.min_version,
            max_version = %cfg.max_version,
            self_signed = cfg.cert.is_none(),
            verify_client,
            length_hiding,
            "TLS configured"
        );

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
            client_verifier,
        })
    }

    pub async fn accept(&self, tcp: TcpStream) -> Result<Endpoint<NearSession>, TlsError> {
        let session = self.acceptor.accept(tcp).await.map_err(TlsError::Handshake)?;
        Ok(Endpoint::new(session))
    }

    /// Check the client's chain against the configured trust anchors.
    pub fn verify_client<S: Session>(&self, endpoint: &Endpoint<S>) -> Result<(), TlsError> {
        let verifier = self
            .client_verifier
            .as_ref()
            .ok_or_else(|| TlsError::Config("client verification not configured".into()))?;
        let chain = endpoint.peer_certificates();
        let (end_entity, intermediates) =
            chain.split_first().ok_or(TlsError::MissingPeerCertificate)?;
        verifier.verify_client_cert(end_entity, intermediates, UnixTime::now())?;
        Ok(())
    }
}

/// Client-role context, used towards the destination.
#[derive(Clone)]
pub struct ClientTlsContext {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    server_verifier: Arc<WebPkiServerVerifier>,
}

impl ClientTlsContext {
    /// Build from config. `server_name` is sent as SNI and is the name the
    /// destination's certificate is checked against. Trust anchors come from
    /// `cfg.ca`, or the bundled web PKI roots.
    pub fn new(
        cfg: &TlsSideConfig,
        server_name: &str,
        length_hiding: bool,
    ) -> Result<Self, TlsError> {
        let provider = crypto_provider(cfg)?;
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsError::InvalidServerName(server_name.to_string()))?;

        let roots = match cfg.ca.as_deref() {
            Some(ca) => load_root_store(ca)?,
            None => webpki_root_store(),
        };
        let server_verifier =
            WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()?;

        let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(protocol_versions(cfg))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DeferredServerVerifier::new(provider)));

        let mut config = match (&cfg.cert, &cfg.key) {
            (Some(cert), Some(key)) => {
                builder.with_client_auth_cert(load_certs(cert)?, load_private_key(key)?)?
            }
            _ => builder.with_no_client_auth(),
        };
        if length_hiding {
            config.alpn_protocols = vec![LENGTH_HIDING_ALPN.to_vec()];
        }

        info!(
            role = "client",
            server_name = ?server_name,
            min_version = %cfg.min_version,
            max_version = %cfg.max_version,
            client_cert = cfg.cert.is_some(),
            length_hiding,
            "TLS configured"
        );

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
            server_verifier,
        })
    }

    pub async fn connect(&self, tcp: TcpStream) -> Result<Endpoint<FarSession>, TlsError> {
        let session = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(TlsError::Handshake)?;
        Ok(Endpoint::new(session))
    }

    /// Check the destination's chain and name against the trust anchors.
    pub fn verify_server<S: Session>(&self, endpoint: &Endpoint<S>) -> Result<(), TlsError> {
        let chain = endpoint.peer_certificates();
        let (end_entity, intermediates) =
            chain.split_first().ok_or(TlsError::MissingPeerCertificate)?;
        self.server_verifier.verify_server_cert(
            end_entity,
            intermediates,
            &self.server_name,
            &[],
            UnixTime::now(),
        )?;
        Ok(())
    }
}

static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

fn protocol_versions(cfg: &TlsSideConfig) -> &'static [&'static SupportedProtocolVersion] {
    match (cfg.min_version.as_str(), cfg.max_version.as_str()) {
        ("tls13", "tls13") => TLS13_ONLY,
        ("tls12", "tls12") => TLS12_ONLY,
        _ => rustls::ALL_VERSIONS,
    }
}

/// The process default provider (aws-lc-rs when none is installed),
/// restricted to the configured cipher suites.
fn crypto_provider(cfg: &TlsSideConfig) -> Result<Arc<CryptoProvider>, TlsError> {
    let default_provider = CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    if cfg.cipher_suites.is_empty() {
        return Ok(default_provider);
    }

    let all_suites = &default_provider.cipher_suites;
    let mut selected = Vec::with_capacity(cfg.cipher_suites.len());
    let mut not_found = Vec::new();
    for name in &cfg.cipher_suites {
        let suite_name = name.trim();
        if let Some(suite) = all_suites.iter().find(|s| {
            let debug_name = format!("{:?}", s.suite());
            debug_name == suite_name || debug_name.ends_with(suite_name)
        }) {
            selected.push(*suite);
        } else {
            not_found.push(suite_name);
        }
    }

    if !not_found.is_empty() {
        warn!(
            not_found = ?not_found,
            available = ?all_suites.iter().map(|s| format!("{:?}", s.suite())).collect::<Vec<_>>(),
            "some cipher suites not found"
        );
    }
    if selected.is_empty() {
        return Err(TlsError::Config("no valid cipher suites specified".into()));
    }

    Ok(Arc::new(CryptoProvider {
        cipher_suites: selected,
        ..(*default_provider).clone()
    }))
}
