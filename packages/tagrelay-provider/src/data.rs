use chrono::{DateTime, Utc};
use serde::Serialize;

use tagrelay_utils::{file_type, Platform, Version};

/// Provider-specific handle used to fetch an asset's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRef {
    pub id: String,
    pub url: String,
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    pub filename: String,
    /// `None` when the filename names no known platform (checksums, notes, ...).
    pub platform: Option<Platform>,
    pub filetype: String,
    pub size: u64,
    pub content_type: String,
    pub download_url: String,
    #[serde(skip)]
    pub reference: AssetRef,
}

impl Asset {
    /// Build an asset, deriving its platform and file type from the filename.
    pub fn new(filename: &str, download_url: &str) -> Self {
        Asset {
            filename: filename.to_string(),
            platform: Platform::detect(filename),
            filetype: file_type(filename),
            size: 0,
            content_type: "application/octet-stream".to_string(),
            download_url: download_url.to_string(),
            reference: AssetRef {
                id: filename.to_string(),
                url: download_url.to_string(),
            },
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    pub fn with_reference(mut self, id: &str, url: &str) -> Self {
        self.reference = AssetRef {
            id: id.to_string(),
            url: url.to_string(),
        };
        self
    }

    pub fn platform_key(&self) -> Option<String> {
        self.platform.map(|p| p.key())
    }
}

/// One tagged, published release. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Release {
    pub tag: String,
    pub channel: String,
    pub published_at: DateTime<Utc>,
    pub notes: String,
    /// Unique by filename.
    pub assets: Vec<Asset>,
    #[serde(skip)]
    version: Version,
}

impl Release {
    /// Returns `None` when `tag` cannot be read as a version.
    pub fn new(tag: &str, published_at: DateTime<Utc>) -> Option<Self> {
        let version = Version::parse(tag)?;
        Some(Release {
            tag: tag.to_string(),
            channel: version.channel(),
            published_at,
            notes: String::new(),
            assets: Vec::new(),
            version,
        })
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }

    pub fn with_channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self
    }

    /// Adds an asset unless one with the same filename is already attached.
    pub fn with_asset(mut self, asset: Asset) -> Self {
        if !self.assets.iter().any(|a| a.filename == asset.filename) {
            self.assets.push(asset);
        }
        self
    }

    pub fn with_assets(self, assets: impl IntoIterator<Item = Asset>) -> Self {
        assets.into_iter().fold(self, |release, asset| release.with_asset(asset))
    }

    pub fn has_platform(&self, platform: &Platform) -> bool {
        self.assets.iter().any(|a| a.platform.as_ref() == Some(platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tagrelay_utils::STABLE_CHANNEL;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_release_channel_from_tag() {
        let stable = Release::new("v1.2.0", date()).unwrap();
        assert_eq!(stable.channel, STABLE_CHANNEL);
        let beta = Release::new("v1.3.0-beta.2", date()).unwrap();
        assert_eq!(beta.channel, "beta");
        assert!(Release::new("latest-build", date()).is_none());
    }

    #[test]
    fn test_assets_unique_by_filename() {
        let release = Release::new("1.0.0", date())
            .unwrap()
            .with_asset(Asset::new("App.dmg", "https://a/1"))
            .with_asset(Asset::new("App.dmg", "https://a/2"))
            .with_asset(Asset::new("App.exe", "https://a/3"));
        assert_eq!(release.assets.len(), 2);
        assert_eq!(release.assets[0].download_url, "https://a/1");
    }

    #[test]
    fn test_asset_detection() {
        let asset = Asset::new("App-1.0.0-mac.zip", "https://a/App-1.0.0-mac.zip").with_size(42);
        assert_eq!(asset.platform_key().as_deref(), Some("osx_64"));
        assert_eq!(asset.filetype, ".zip");
        assert_eq!(asset.size, 42);
        assert_eq!(asset.reference.id, "App-1.0.0-mac.zip");

        let release = Release::new("1.0.0", date()).unwrap().with_asset(asset);
        assert!(release.has_platform(&Platform::detect("osx").unwrap()));
        assert!(!release.has_platform(&Platform::detect("win32").unwrap()));
    }
}
