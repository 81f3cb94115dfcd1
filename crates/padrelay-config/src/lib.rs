//! Configuration for padrelay.
//!
//! A configuration file holds one `[relays.<name>]` table per relay and an
//! optional `[defaults]` table whose keys apply to every relay that does not
//! set them itself.

mod address;
pub mod defaults;
pub mod errors;
mod loader;
mod types;
mod validate;

pub use address::{AddressError, AddressFamily, HostPort};
pub use loader::{ConfigError, load_config, parse_config};
pub use types::{
    Config, LoggingConfig, PaddingRange, ProxyConfig, ProxyKind, RelayConfig, TlsSideConfig,
};
pub use validate::{validate_config, validate_relay};
