//! Error types for the relay crate.

use std::fmt;
use std::io;

use padrelay_config::ConfigError;
use padrelay_config::errors::{
    ERROR_AUTH, ERROR_CONFIG, ERROR_IO, ERROR_LENGTH_HIDING, ERROR_PROXY, ERROR_RESOLVE,
};
use padrelay_tls::TlsError;
use thiserror::Error;

/// Which side of a forwarding flow failed.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Reading from the source endpoint failed.
    #[error("read failed: {0}")]
    Reader(#[source] io::Error),

    /// Writing to the destination endpoint failed.
    #[error("write failed: {0}")]
    Writer(#[source] io::Error),
}

impl FlowError {
    pub fn error_type(&self) -> &'static str {
        ERROR_IO
    }
}

/// A step of session establishment, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstablishStep {
    NearHandshake,
    NearAuth,
    NearLengthHiding,
    DialFar,
    FarHandshake,
    FarAuth,
    FarLengthHiding,
}

impl EstablishStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstablishStep::NearHandshake => "near_handshake",
            EstablishStep::NearAuth => "near_auth",
            EstablishStep::NearLengthHiding => "near_length_hiding",
            EstablishStep::DialFar => "dial_far",
            EstablishStep::FarHandshake => "far_handshake",
            EstablishStep::FarAuth => "far_auth",
            EstablishStep::FarLengthHiding => "far_length_hiding",
        }
    }
}

impl fmt::Display for EstablishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum EstablishFailure {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("peer verification failed: {0}")]
    Verification(#[source] TlsError),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("peer does not support length hiding")]
    LengthHidingUnsupported,
}

impl EstablishFailure {
    pub fn error_type(&self) -> &'static str {
        match self {
            EstablishFailure::Io(_) => ERROR_IO,
            EstablishFailure::Tls(e) => e.error_type(),
            EstablishFailure::Verification(_) => ERROR_AUTH,
            EstablishFailure::Proxy(_) => ERROR_PROXY,
            EstablishFailure::Resolve(_) => ERROR_RESOLVE,
            EstablishFailure::LengthHidingUnsupported => ERROR_LENGTH_HIDING,
        }
    }
}

/// Establishment aborted at `step`.
#[derive(Error, Debug)]
#[error("{step} failed: {kind}")]
pub struct EstablishmentError {
    pub step: EstablishStep,
    #[source]
    pub kind: EstablishFailure,
}

impl EstablishmentError {
    pub fn new(step: EstablishStep, kind: EstablishFailure) -> Self {
        Self { step, kind }
    }

    pub fn error_type(&self) -> &'static str {
        self.kind.error_type()
    }
}

/// A relay's listener could not be created.
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("listen address {0}: {1}")]
    Address(String, #[source] io::Error),

    #[error("bind {0}: {1}")]
    Bind(String, #[source] io::Error),

    #[error("tls: {0}")]
    Tls(#[from] TlsError),
}

impl ListenerError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ListenerError::Config(_) => ERROR_CONFIG,
            ListenerError::Address(..) => ERROR_RESOLVE,
            ListenerError::Bind(..) => ERROR_IO,
            ListenerError::Tls(e) => e.error_type(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("no relay instance started")]
    NoRelayStarted,
}
