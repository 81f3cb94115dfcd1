//! Error classification strings, used as the `error_type` log field.

pub const ERROR_TLS_HANDSHAKE: &str = "tls_handshake";
pub const ERROR_AUTH: &str = "auth";
pub const ERROR_IO: &str = "io";
pub const ERROR_CONFIG: &str = "config";
pub const ERROR_RESOLVE: &str = "resolve";
pub const ERROR_PROXY: &str = "proxy";
pub const ERROR_LENGTH_HIDING: &str = "length_hiding";
