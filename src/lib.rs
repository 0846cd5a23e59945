//! Update gateway serving Squirrel-style auto-update endpoints from the
//! releases of a GitHub or GitLab repository.
//!
//! Each concern lives in its own workspace crate; this crate re-exports them
//! under one roof.

pub use tagrelay_config as config;
pub use tagrelay_core as service;
pub use tagrelay_index as index;
pub use tagrelay_provider as provider;
pub use tagrelay_server as server;
pub use tagrelay_utils as utils;

pub use tagrelay_config::GatewayConfig;
pub use tagrelay_core::UpdateService;
pub use tagrelay_index::ReleaseIndex;
pub use tagrelay_server::GatewayServer;
pub use tagrelay_utils::GatewayError;
