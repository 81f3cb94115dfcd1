//! Configuration file loading and error types.

use std::{fs, path::Path};

use toml::{Table, Value};

use crate::Config;
use crate::errors::{ERROR_CONFIG, ERROR_IO};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("validation: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ConfigError::Io(_) => ERROR_IO,
            ConfigError::Toml(_) | ConfigError::Validation(_) => ERROR_CONFIG,
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let data = fs::read_to_string(path.as_ref())?;
    parse_config(&data)
}

/// Parse a TOML document, applying `[defaults]` under every relay.
///
/// Relays are not validated here; each relay is validated when its listener
/// is created so that one bad relay does not prevent the others from running.
pub fn parse_config(data: &str) -> Result<Config, ConfigError> {
    let mut root: Table = toml::from_str(data)?;
    let defaults = match root.remove("defaults") {
        Some(Value::Table(t)) => t,
        Some(_) => return Err(ConfigError::Validation("defaults must be a table".into())),
        None => Table::new(),
    };
    if let Some(relays) = root.get_mut("relays") {
        let Value::Table(relays) = relays else {
            return Err(ConfigError::Validation("relays must be a table".into()));
        };
        for (name, relay) in relays.iter_mut() {
            let Value::Table(relay) = relay else {
                return Err(ConfigError::Validation(format!(
                    "relays.{name} must be a table"
                )));
            };
            let mut merged = defaults.clone();
            merge_table(&mut merged, std::mem::take(relay));
            *relay = merged;
        }
    }
    Ok(Value::Table(root).try_into()?)
}

/// Overlay `overlay` onto `base`; nested tables merge key by key.
fn merge_table(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_table(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
