//! Picking one asset out of a resolved release.
//!
//! When a release ships several files for one platform, the tie is broken
//! by file type: an explicitly requested type wins when present, otherwise
//! the per-OS preference table decides. The default table is
//! [`Os::default_file_preference`]; deployments may override single rows.

use std::collections::BTreeMap;

use tagrelay_provider::{Asset, Release};
use tagrelay_utils::{GatewayError, Os, Platform, Result};

/// Per-OS file-type preference table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePreference {
    overrides: BTreeMap<Os, Vec<String>>,
}

impl FilePreference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the preference row of one OS family. Types are matched
    /// case-insensitively, with or without the leading dot.
    pub fn with_override<I, S>(mut self, os: Os, filetypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filetypes = filetypes
            .into_iter()
            .map(|t| normalize_filetype(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        self.overrides.insert(os, filetypes);
        self
    }

    /// Preferred file types for `os`, most preferred first.
    pub fn order(&self, os: Os) -> Vec<String> {
        match self.overrides.get(&os) {
            Some(order) => order.clone(),
            None => os
                .default_file_preference()
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }

    fn rank(&self, os: Os, filetype: &str) -> usize {
        let order = self.order(os);
        order
            .iter()
            .position(|t| t == filetype)
            .unwrap_or(order.len())
    }
}

/// `zip`, `.ZIP` and `.zip` all name the same file type.
pub fn normalize_filetype(filetype: &str) -> String {
    let filetype = filetype.trim().to_lowercase();
    if filetype.is_empty() || filetype.starts_with('.') {
        filetype
    } else {
        format!(".{}", filetype)
    }
}

pub fn select_by_filename<'a>(release: &'a Release, filename: &str) -> Result<&'a Asset> {
    release
        .assets
        .iter()
        .find(|asset| asset.filename == filename)
        .ok_or_else(|| {
            GatewayError::AssetNotFound(format!("{} has no file named {}", release.tag, filename))
        })
}

/// Best asset of `release` for `platform`.
///
/// Ties within the same rank keep the release's asset order.
pub fn select_by_platform<'a>(
    release: &'a Release,
    platform: &Platform,
    preferred_filetype: Option<&str>,
    preferences: &FilePreference,
) -> Result<&'a Asset> {
    let candidates: Vec<&Asset> = release
        .assets
        .iter()
        .filter(|asset| asset.platform.as_ref() == Some(platform))
        .collect();

    if let Some(wanted) = preferred_filetype.map(normalize_filetype).filter(|t| !t.is_empty()) {
        if let Some(asset) = candidates.iter().find(|asset| asset.filetype == wanted) {
            return Ok(*asset);
        }
        tracing::debug!(tag = %release.tag, %platform, %wanted, "preferred file type unavailable");
    }

    candidates
        .into_iter()
        .min_by_key(|asset| preferences.rank(platform.os, &asset.filetype))
        .ok_or_else(|| {
            GatewayError::AssetNotFound(format!(
                "{} has no download for platform {}",
                release.tag, platform
            ))
        })
}
