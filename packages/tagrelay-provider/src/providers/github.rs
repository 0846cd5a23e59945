use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use super::{base_headers, fetch_asset, fetch_listing, parse_date};
use crate::data::{Asset, AssetRef, Release};
use crate::source::ReleaseSource;
use tagrelay_utils::{GatewayError, Result};

pub const GITHUB_API_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 10;

/// Releases of one GitHub repository.
///
/// With a token, asset bytes are fetched through the API so private
/// repositories work; without one, through the public download URL.
#[derive(Debug, Clone)]
pub struct GitHubSource {
    owner: String,
    repo: String,
    token: Option<String>,
    api_url: String,
}

impl GitHubSource {
    pub fn new(owner: &str, repo: &str) -> Self {
        GitHubSource {
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: None,
            api_url: GITHUB_API_URL.to_string(),
        }
    }

    /// Parse an `owner/repo` slug.
    pub fn from_slug(slug: &str) -> Option<Self> {
        let (owner, repo) = slug.trim().trim_matches('/').split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self::new(owner, repo))
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Point at a GitHub Enterprise or mock API root.
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    fn releases_url(&self, page: usize) -> String {
        format!(
            "{}/repos/{}/{}/releases?per_page={}&page={}",
            self.api_url, self.owner, self.repo, PER_PAGE, page
        )
    }

    fn parse_asset(&self, json: &Value) -> Option<Asset> {
        let filename = json.get("name")?.as_str()?;
        let download_url = json.get("browser_download_url")?.as_str()?;
        let id = json.get("id").map(|v| v.to_string()).unwrap_or_default();
        let api_url = json.get("url").and_then(|v| v.as_str());
        let fetch_url = match (&self.token, api_url) {
            (Some(_), Some(api_url)) => api_url,
            _ => download_url,
        };
        let mut asset = Asset::new(filename, download_url)
            .with_size(json.get("size").and_then(|v| v.as_u64()).unwrap_or(0))
            .with_reference(&id, fetch_url);
        if let Some(content_type) = json.get("content_type").and_then(|v| v.as_str()) {
            asset = asset.with_content_type(content_type);
        }
        Some(asset)
    }

    fn parse_release(&self, json: &Value) -> Option<Release> {
        if json.get("draft").and_then(|v| v.as_bool()).unwrap_or(false) {
            return None;
        }
        let tag = json.get("tag_name")?.as_str()?;
        let published_at = parse_date(json.get("published_at").and_then(|v| v.as_str()))
            .or_else(|| parse_date(json.get("created_at").and_then(|v| v.as_str())))?;
        let release = match Release::new(tag, published_at) {
            Some(release) => release,
            None => {
                tracing::warn!(tag, "skipping release with unreadable version tag");
                return None;
            }
        };
        let notes = json.get("body").and_then(|v| v.as_str()).unwrap_or_default();
        let assets = json
            .get("assets")
            .and_then(|v| v.as_array())
            .map(|assets| {
                assets
                    .iter()
                    .filter_map(|a| self.parse_asset(a))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Some(release.with_notes(notes).with_assets(assets))
    }
}

#[async_trait]
impl ReleaseSource for GitHubSource {
    fn get_friendly_name(&self) -> &'static str {
        "github"
    }

    async fn list_releases(&self) -> Result<Vec<Release>> {
        let mut header_map = base_headers(self.token.as_deref());
        header_map.insert(
            "Accept".to_string(),
            "application/vnd.github+json".to_string(),
        );

        let mut releases = Vec::new();
        for page in 1..=MAX_PAGES {
            let url = self.releases_url(page);
            let body = fetch_listing(&url, &header_map).await?.body.unwrap_or_default();
            let data = serde_json::from_slice::<Vec<Value>>(&body).map_err(|e| {
                GatewayError::source_unavailable(format!("invalid release list from {}: {}", url, e))
            })?;
            releases.extend(data.iter().filter_map(|json| self.parse_release(json)));
            if data.len() < PER_PAGE {
                break;
            }
        }
        tracing::debug!(
            owner = %self.owner,
            repo = %self.repo,
            count = releases.len(),
            "fetched github releases"
        );
        Ok(releases)
    }

    async fn fetch_asset_bytes(&self, asset: &AssetRef) -> Result<Bytes> {
        let mut header_map = base_headers(self.token.as_deref());
        if self.token.is_some() {
            header_map.insert(
                "Accept".to_string(),
                "application/octet-stream".to_string(),
            );
        }
        fetch_asset(&asset.url, &header_map).await
    }
}
