//! Configuration types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::HostPort;
use crate::defaults::{
    default_buffer_size, default_log_level, default_max_tls_version, default_min_tls_version,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Relays keyed by name; iteration order is name order.
    #[serde(default)]
    pub relays: BTreeMap<String, RelayConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "padrelay_relay=debug,info".
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Settings of a single relay (one listening endpoint, one destination).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub listen_address: HostPort,
    pub server_address: HostPort,
    /// SNI and certificate name used towards the destination.
    /// Defaults to the destination host.
    #[serde(default)]
    pub server_name_indicator: Option<String>,
    /// TLS settings for the server role facing the origin.
    #[serde(default)]
    pub as_server: TlsSideConfig,
    /// TLS settings for the client role facing the destination.
    #[serde(default)]
    pub as_client: TlsSideConfig,
    #[serde(default)]
    pub verify_client_identity: bool,
    #[serde(default)]
    pub verify_server_identity: bool,
    #[serde(default)]
    pub use_length_hiding_with_client: bool,
    #[serde(default)]
    pub use_length_hiding_with_server: bool,
    #[serde(default)]
    pub padding_range_with_client: PaddingRange,
    #[serde(default)]
    pub padding_range_with_server: PaddingRange,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub suppress_exceptions: bool,
}

impl RelayConfig {
    pub fn new(listen_address: HostPort, server_address: HostPort) -> Self {
        Self {
            listen_address,
            server_address,
            server_name_indicator: None,
            as_server: TlsSideConfig::default(),
            as_client: TlsSideConfig::default(),
            verify_client_identity: false,
            verify_server_identity: false,
            use_length_hiding_with_client: false,
            use_length_hiding_with_server: false,
            padding_range_with_client: PaddingRange::default(),
            padding_range_with_server: PaddingRange::default(),
            buffer_size: default_buffer_size(),
            proxy: None,
            suppress_exceptions: false,
        }
    }

    /// Name presented to, and checked against, the destination.
    pub fn server_name(&self) -> &str {
        self.server_name_indicator
            .as_deref()
            .unwrap_or_else(|| self.server_address.bare_host())
    }

    /// Padding applied to data written towards the origin, if any.
    pub fn padding_towards_client(&self) -> Option<PaddingRange> {
        self.use_length_hiding_with_client
            .then_some(self.padding_range_with_client)
    }

    /// Padding applied to data written towards the destination, if any.
    pub fn padding_towards_server(&self) -> Option<PaddingRange> {
        self.use_length_hiding_with_server
            .then_some(self.padding_range_with_server)
    }
}

/// Credentials and protocol policy for one TLS role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSideConfig {
    /// PEM certificate chain.
    #[serde(default)]
    pub cert: Option<String>,
    /// PEM private key.
    #[serde(default)]
    pub key: Option<String>,
    /// PEM trust anchors used to verify the peer.
    #[serde(default)]
    pub ca: Option<String>,
    #[serde(default = "default_min_tls_version")]
    pub min_version: String,
    #[serde(default = "default_max_tls_version")]
    pub max_version: String,
    /// rustls cipher suite names; empty means the provider's defaults.
    #[serde(default)]
    pub cipher_suites: Vec<String>,
}

impl Default for TlsSideConfig {
    fn default() -> Self {
        Self {
            cert: None,
            key: None,
            ca: None,
            min_version: default_min_tls_version(),
            max_version: default_max_tls_version(),
            cipher_suites: Vec::new(),
        }
    }
}

/// Inclusive bounds of the padding added per write, written as `[low, high]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct PaddingRange {
    pub low: i32,
    pub high: i32,
}

impl PaddingRange {
    pub const fn new(low: i32, high: i32) -> Self {
        Self { low, high }
    }
}

impl From<(i32, i32)> for PaddingRange {
    fn from((low, high): (i32, i32)) -> Self {
        Self { low, high }
    }
}

impl From<PaddingRange> for (i32, i32) {
    fn from(range: PaddingRange) -> Self {
        (range.low, range.high)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Socks4,
    Socks5,
    Http,
}

/// Upstream proxy used to reach the destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn address(&self) -> HostPort {
        HostPort::new(self.host.clone(), self.port)
    }
}
