//! `host:port` address literals.
//!
//! The address family is picked from the literal itself: a host wrapped in
//! square brackets selects IPv6, anything else selects IPv4. The brackets
//! are kept in [`HostPort::host`] and stripped by [`HostPort::bare_host`].

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address '{input}': {reason}")]
pub struct AddressError {
    input: String,
    reason: &'static str,
}

impl AddressError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostPort {
    host: String,
    port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        let (host, port) = if input.starts_with('[') {
            let end = input
                .find(']')
                .ok_or_else(|| AddressError::new(input, "unterminated '['"))?;
            let rest = &input[end + 1..];
            let port = rest
                .strip_prefix(':')
                .ok_or_else(|| AddressError::new(input, "missing port"))?;
            (&input[..=end], port)
        } else {
            input
                .rsplit_once(':')
                .ok_or_else(|| AddressError::new(input, "missing port"))?
        };
        if host.is_empty() || host == "[]" {
            return Err(AddressError::new(input, "empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressError::new(input, "invalid port"))?;
        Ok(Self::new(host, port))
    }

    /// Host as written, brackets included.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host with IPv6 brackets removed.
    pub fn bare_host(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn family(&self) -> AddressFamily {
        if self.host.starts_with('[') {
            AddressFamily::V6
        } else {
            AddressFamily::V4
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<String> for HostPort {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HostPort> for String {
    fn from(value: HostPort) -> Self {
        value.to_string()
    }
}
