use async_trait::async_trait;
use bytes::Bytes;
use hyper::HeaderMap;
use serde_json::Value;
use urlencoding::encode;

use super::{base_headers, fetch_asset, fetch_listing, parse_date};
use crate::data::{Asset, AssetRef, Release};
use crate::source::ReleaseSource;
use tagrelay_utils::{GatewayError, Result};

const GITLAB_HOST: &str = "gitlab.com";

const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 10;

/// Releases of one GitLab project.
///
/// Only release links are indexed; generated source archives name no
/// platform and are never served to update clients.
#[derive(Debug, Clone)]
pub struct GitLabSource {
    project: String,
    token: Option<String>,
    api_base: String,
}

impl GitLabSource {
    /// `project` is a numeric id or a `group/project` path.
    pub fn new(project: &str) -> Self {
        GitLabSource {
            project: project.to_string(),
            token: None,
            api_base: Self::api_base_for(GITLAB_HOST),
        }
    }

    fn api_base_for(host: &str) -> String {
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}/api/v4", host.trim_end_matches('/'))
        } else {
            format!("https://{}/api/v4", host.trim_end_matches('/'))
        }
    }

    /// Self-hosted instance, given as a host name or a base URL.
    pub fn with_host(mut self, host: &str) -> Self {
        self.api_base = Self::api_base_for(host);
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    fn releases_url(&self, page: usize) -> String {
        format!(
            "{}/projects/{}/releases?per_page={}&page={}",
            self.api_base,
            encode(&self.project),
            PER_PAGE,
            page
        )
    }

    /// `X-Next-Page`, empty on the last page.
    fn next_page(headers: &HeaderMap) -> Option<usize> {
        headers.get("x-next-page")?.to_str().ok()?.trim().parse().ok()
    }

    fn parse_link(&self, link: &Value) -> Option<Asset> {
        let name = link["name"].as_str()?;
        let url = link["direct_asset_url"]
            .as_str()
            .or_else(|| link["url"].as_str())?;
        let id = link["id"].to_string();
        let content_type = match link["link_type"].as_str() {
            Some("image") => "application/x-iso9660-image",
            _ => "application/octet-stream",
        };
        Some(
            Asset::new(name, url)
                .with_content_type(content_type)
                .with_reference(&id, url),
        )
    }

    fn parse_release(&self, release_data: &Value) -> Option<Release> {
        if release_data["upcoming_release"].as_bool().unwrap_or(false) {
            return None;
        }
        let tag = release_data["tag_name"].as_str()?;
        let published_at = parse_date(release_data["released_at"].as_str())
            .or_else(|| parse_date(release_data["created_at"].as_str()))?;
        let release = match Release::new(tag, published_at) {
            Some(release) => release,
            None => {
                tracing::warn!(tag, "skipping release with unreadable version tag");
                return None;
            }
        };
        let notes = release_data["description"].as_str().unwrap_or_default();
        let assets = release_data["assets"]["links"]
            .as_array()
            .map(|links| {
                links
                    .iter()
                    .filter_map(|link| self.parse_link(link))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Some(release.with_notes(notes).with_assets(assets))
    }
}

#[async_trait]
impl ReleaseSource for GitLabSource {
    fn get_friendly_name(&self) -> &'static str {
        "gitlab"
    }

    async fn list_releases(&self) -> Result<Vec<Release>> {
        let header_map = base_headers(self.token.as_deref());
        let mut releases = Vec::new();
        let mut page = 1;
        for _ in 0..MAX_PAGES {
            let url = self.releases_url(page);
            let rsp = fetch_listing(&url, &header_map).await?;
            let body = rsp.body.unwrap_or_default();
            let data = serde_json::from_slice::<Vec<Value>>(&body).map_err(|e| {
                GatewayError::source_unavailable(format!("invalid release list from {}: {}", url, e))
            })?;
            releases.extend(data.iter().filter_map(|json| self.parse_release(json)));
            match Self::next_page(&rsp.headers) {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        tracing::debug!(project = %self.project, count = releases.len(), "fetched gitlab releases");
        Ok(releases)
    }

    async fn fetch_asset_bytes(&self, asset: &AssetRef) -> Result<Bytes> {
        fetch_asset(&asset.url, &base_headers(self.token.as_deref())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_releases_url_encodes_project_path() {
        let source = GitLabSource::new("group/app");
        assert_eq!(
            source.releases_url(1),
            "https://gitlab.com/api/v4/projects/group%2Fapp/releases?per_page=100&page=1"
        );
        let source = GitLabSource::new("42").with_host("git.example.org");
        assert_eq!(
            source.releases_url(2),
            "https://git.example.org/api/v4/projects/42/releases?per_page=100&page=2"
        );
        let source = GitLabSource::new("42").with_host("http://127.0.0.1:1234/");
        assert_eq!(
            source.releases_url(1),
            "http://127.0.0.1:1234/api/v4/projects/42/releases?per_page=100&page=1"
        );
    }

    #[test]
    fn test_parse_release_links() {
        let source = GitLabSource::new("group/app");
        let data = json!({
            "tag_name": "v2.0.0-beta.1",
            "description": "Beta notes",
            "released_at": "2024-03-01T10:00:00.000Z",
            "assets": {
                "links": [
                    {
                        "id": 5,
                        "name": "App-2.0.0-beta.1.dmg",
                        "url": "https://gitlab.com/group/app/-/releases/v2.0.0-beta.1/downloads/App.dmg",
                        "direct_asset_url": "https://gitlab.com/group/app/-/releases/v2.0.0-beta.1/downloads/App.dmg",
                        "link_type": "package"
                    }
                ],
                "sources": [
                    { "format": "zip", "url": "https://gitlab.com/group/app/-/archive/v2.0.0-beta.1/app.zip" }
                ]
            }
        });
        let release = source.parse_release(&data).unwrap();
        assert_eq!(release.channel, "beta");
        assert_eq!(release.notes, "Beta notes");
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].reference.id, "5");
        assert_eq!(release.assets[0].platform_key().as_deref(), Some("osx_64"));
    }

    #[test]
    fn test_parse_release_skips_upcoming() {
        let source = GitLabSource::new("group/app");
        let data = json!({
            "tag_name": "v3.0.0",
            "upcoming_release": true,
            "released_at": "2030-01-01T00:00:00Z",
        });
        assert!(source.parse_release(&data).is_none());
    }
}
