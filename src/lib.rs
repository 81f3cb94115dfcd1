//! # padrelay
//!
//! Interactive TLS relay with optional length hiding.
//!
//! ## Crates
//!
//! - [`padrelay_config`] - Configuration types, loading and validation
//! - [`padrelay_tls`] - TLS contexts, session endpoints and the length-hiding codec
//! - [`padrelay_relay`] - Listeners, session establishment and forwarding

pub use padrelay_config as config;
pub use padrelay_relay as relay;
pub use padrelay_tls as tls;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use padrelay_config::{Config, RelayConfig, load_config, validate_config};
    pub use padrelay_relay::{Listener, Supervisor, SupervisorError};
    pub use padrelay_relay::cli::{RelayArgs, run, run_until};
}
