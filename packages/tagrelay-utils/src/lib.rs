pub mod error;
pub mod http;
pub mod platform;
pub mod versioning;

// Re-export main utilities
pub use error::{GatewayError, Result};
pub use http::{get, get_following_redirects, http_status_is_ok, ResponseData};
pub use platform::{file_type, Arch, Os, OsFamily, Platform};
pub use versioning::{Version, STABLE_CHANNEL};
