//! TLS error types.

use std::io;

use padrelay_config::errors::{ERROR_AUTH, ERROR_CONFIG, ERROR_IO, ERROR_TLS_HANDSHAKE};

/// Errors raised while building TLS contexts or establishing sessions.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("certificate generation failed: {0}")]
    CertGeneration(String),

    #[error("verifier error: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error("peer presented no certificate")]
    MissingPeerCertificate,

    #[error("invalid server name: {0}")]
    InvalidServerName(String),
}

impl TlsError {
    pub fn error_type(&self) -> &'static str {
        match self {
            TlsError::Io(_) => ERROR_IO,
            TlsError::Tls(_) | TlsError::Handshake(_) => ERROR_TLS_HANDSHAKE,
            TlsError::Config(_)
            | TlsError::CertGeneration(_)
            | TlsError::Verifier(_)
            | TlsError::InvalidServerName(_) => ERROR_CONFIG,
            TlsError::MissingPeerCertificate => ERROR_AUTH,
        }
    }
}
