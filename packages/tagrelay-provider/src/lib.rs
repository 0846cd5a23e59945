pub mod data;
pub mod providers;
pub mod source;

// Re-export common types
pub use data::{Asset, AssetRef, Release};
pub use providers::{GitHubSource, GitLabSource};
pub use source::{ReleaseSource, StaticSource};
