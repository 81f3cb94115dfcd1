//! Configuration validation logic.

use crate::defaults::{MAX_BUFFER_SIZE, MAX_PADDING_MAGNITUDE};
use crate::loader::ConfigError;
use crate::{Config, PaddingRange, ProxyKind, RelayConfig, TlsSideConfig};

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.logging.level.trim().is_empty() {
        return Err(ConfigError::Validation("logging.level is empty".into()));
    }
    for (name, relay) in &config.relays {
        validate_relay(name, relay)?;
    }
    Ok(())
}

pub fn validate_relay(name: &str, relay: &RelayConfig) -> Result<(), ConfigError> {
    if relay.buffer_size == 0 || relay.buffer_size > MAX_BUFFER_SIZE {
        return Err(ConfigError::Validation(format!(
            "relays.{name}.buffer_size must be 1..={MAX_BUFFER_SIZE}"
        )));
    }
    validate_padding(
        name,
        "padding_range_with_client",
        relay.padding_range_with_client,
    )?;
    validate_padding(
        name,
        "padding_range_with_server",
        relay.padding_range_with_server,
    )?;
    validate_tls_side(name, "as_server", &relay.as_server)?;
    validate_tls_side(name, "as_client", &relay.as_client)?;
    if relay.verify_client_identity && relay.as_server.ca.is_none() {
        return Err(ConfigError::Validation(format!(
            "relays.{name}.verify_client_identity requires as_server.ca"
        )));
    }
    if let Some(sni) = &relay.server_name_indicator
        && sni.trim().is_empty()
    {
        return Err(ConfigError::Validation(format!(
            "relays.{name}.server_name_indicator is empty"
        )));
    }
    if let Some(proxy) = &relay.proxy {
        if proxy.host.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "relays.{name}.proxy.host is empty"
            )));
        }
        if proxy.port == 0 {
            return Err(ConfigError::Validation(format!(
                "relays.{name}.proxy.port must be > 0"
            )));
        }
        let user_only = proxy.username.is_some() && proxy.password.is_none();
        let password_only = proxy.username.is_none() && proxy.password.is_some();
        if password_only || (user_only && proxy.kind != ProxyKind::Socks4) {
            return Err(ConfigError::Validation(format!(
                "relays.{name}.proxy username and password must be set together"
            )));
        }
    }
    Ok(())
}

fn validate_padding(name: &str, field: &str, range: PaddingRange) -> Result<(), ConfigError> {
    if range.low > range.high {
        return Err(ConfigError::Validation(format!(
            "relays.{name}.{field}: low cannot be greater than high"
        )));
    }
    let limit = -MAX_PADDING_MAGNITUDE..=MAX_PADDING_MAGNITUDE;
    if !limit.contains(&range.low) || !limit.contains(&range.high) {
        return Err(ConfigError::Validation(format!(
            "relays.{name}.{field}: bounds must be within {MAX_PADDING_MAGNITUDE} of zero"
        )));
    }
    Ok(())
}

fn validate_tls_side(name: &str, side: &str, tls: &TlsSideConfig) -> Result<(), ConfigError> {
    if tls.cert.is_some() != tls.key.is_some() {
        return Err(ConfigError::Validation(format!(
            "relays.{name}.{side}: cert and key must be set together"
        )));
    }
    let valid_versions = ["tls12", "tls13"];
    for (field, value) in [("min_version", &tls.min_version), ("max_version", &tls.max_version)] {
        if !valid_versions.contains(&value.as_str()) {
            return Err(ConfigError::Validation(format!(
                "relays.{name}.{side}.{field} must be one of: {valid_versions:?}"
            )));
        }
    }
    if tls.min_version == "tls13" && tls.max_version == "tls12" {
        return Err(ConfigError::Validation(format!(
            "relays.{name}.{side}.min_version cannot be greater than max_version"
        )));
    }
    Ok(())
}
