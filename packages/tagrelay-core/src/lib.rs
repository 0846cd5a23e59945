pub mod manifest;
pub mod notes;
pub mod routes;
pub mod selector;
pub mod service;

// Re-export main types
pub use manifest::{
    derive_semver, rewrite, select_manifest_asset, windows_version, LineEnding, Manifest,
    ManifestEntry, MANIFEST, MANIFEST_X64,
};
pub use routes::RouteTemplate;
pub use selector::{normalize_filetype, select_by_filename, select_by_platform, FilePreference};
pub use service::{
    DownloadRequest, NotesFormat, UpdateCheck, UpdateDescriptor, UpdateRequest, UpdateService,
    ALL_CHANNELS, DEFAULT_UPDATE_FILETYPE,
};
