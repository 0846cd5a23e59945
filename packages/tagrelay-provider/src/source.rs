use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::data::{AssetRef, Release};
use tagrelay_utils::{GatewayError, Result};

/// A release-hosting backend.
///
/// Implementations only translate the provider's API into [`Release`]
/// records; caching, ordering and channel semantics live in the index.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    fn get_friendly_name(&self) -> &'static str;

    /// Every published release. Fails with `SourceUnavailable`.
    async fn list_releases(&self) -> Result<Vec<Release>>;

    /// Content of one asset. Fails with `SourceUnavailable` or `AssetNotFound`.
    async fn fetch_asset_bytes(&self, asset: &AssetRef) -> Result<Bytes>;
}

/// A fixed, in-memory release list. Asset bytes are keyed by `AssetRef::id`.
#[derive(Debug, Default, Clone)]
pub struct StaticSource {
    releases: Vec<Release>,
    contents: HashMap<String, Bytes>,
}

impl StaticSource {
    pub fn new(releases: Vec<Release>) -> Self {
        Self {
            releases,
            contents: HashMap::new(),
        }
    }

    pub fn with_content(mut self, id: &str, content: impl Into<Bytes>) -> Self {
        self.contents.insert(id.to_string(), content.into());
        self
    }
}

#[async_trait]
impl ReleaseSource for StaticSource {
    fn get_friendly_name(&self) -> &'static str {
        "static"
    }

    async fn list_releases(&self) -> Result<Vec<Release>> {
        Ok(self.releases.clone())
    }

    async fn fetch_asset_bytes(&self, asset: &AssetRef) -> Result<Bytes> {
        self.contents
            .get(&asset.id)
            .cloned()
            .ok_or_else(|| GatewayError::AssetNotFound(asset.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Asset;
    use chrono::Utc;

    #[tokio::test]
    async fn test_static_source() {
        let release = Release::new("1.0.0", Utc::now())
            .unwrap()
            .with_asset(Asset::new("RELEASES", "https://example.com/RELEASES"));
        let source = StaticSource::new(vec![release.clone()]).with_content("RELEASES", "abc");

        assert_eq!(source.list_releases().await.unwrap(), vec![release.clone()]);
        let bytes = source
            .fetch_asset_bytes(&release.assets[0].reference)
            .await
            .unwrap();
        assert_eq!(bytes, Bytes::from("abc"));

        let missing = AssetRef {
            id: "nope".to_string(),
            url: String::new(),
        };
        assert_eq!(
            source.fetch_asset_bytes(&missing).await,
            Err(GatewayError::AssetNotFound("nope".to_string()))
        );
    }
}
