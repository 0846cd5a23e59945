pub mod error;
pub mod gateway;

// Re-export main types
pub use error::ConfigError;
pub use gateway::{
    BackendConfig, GatewayConfig, DEFAULT_CACHE_TTL_SECS, DEFAULT_LISTEN,
    DEFAULT_SOURCE_TIMEOUT_SECS,
};
