pub mod index;
pub mod query;

// Re-export main types
pub use index::{ReleaseIndex, ReleaseSnapshot, DEFAULT_FETCH_TIMEOUT, DEFAULT_TTL};
pub use query::{ChannelFilter, Comparator, ReleaseQuery, TagConstraint, LATEST, WILDCARD};
