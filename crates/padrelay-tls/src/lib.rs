//! TLS session endpoints for padrelay.
//!
//! - [`context`]: server-role and client-role TLS contexts, including the
//!   identity checks that run after the handshake.
//! - [`endpoint`]: an established session split into a reader half and a
//!   writer half, with idempotent close-notify / shutdown / close.
//! - [`length_hiding`]: the padded unit codec and the range-padded send
//!   primitive.

mod certs;
pub mod context;
pub mod endpoint;
mod error;
pub mod length_hiding;
pub mod session;
mod verify;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use certs::{generate_self_signed, load_certs, load_private_key, load_root_store};
pub use context::{ClientTlsContext, ServerTlsContext};
pub use endpoint::{Endpoint, EndpointMonitor, EndpointReader, EndpointState, EndpointWriter};
pub use error::TlsError;
pub use length_hiding::LENGTH_HIDING_ALPN;
pub use session::{FarSession, NearSession, Role, Session};
