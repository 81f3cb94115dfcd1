//! Default values shared by the config types and the relay runtime.

/// Bytes read from a source endpoint per forwarding iteration.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;
/// Largest value `buffer_size` may take.
pub const MAX_BUFFER_SIZE: usize = u16::MAX as usize;
/// Largest magnitude allowed for either padding range bound.
pub const MAX_PADDING_MAGNITUDE: i32 = u16::MAX as i32;

pub const DEFAULT_TLS_MIN_VERSION: &str = "tls12";
pub const DEFAULT_TLS_MAX_VERSION: &str = "tls13";

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_CONNECTION_BACKLOG: u32 = 1024;

pub const DEFAULT_CONFIG_PATH: &str = "padrelay.toml";

macro_rules! default_fns {
    ($($fn_name:ident => $const_name:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> $ty {
                $const_name
            }
        )*
    };
}

macro_rules! default_string_fns {
    ($($fn_name:ident => $const_name:ident),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> String {
                $const_name.to_string()
            }
        )*
    };
}

default_fns! {
    default_buffer_size => DEFAULT_BUFFER_SIZE: usize,
}

default_string_fns! {
    default_min_tls_version => DEFAULT_TLS_MIN_VERSION,
    default_max_tls_version => DEFAULT_TLS_MAX_VERSION,
    default_log_level       => DEFAULT_LOG_LEVEL,
}
