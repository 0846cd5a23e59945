use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::manifest::{rewrite, select_manifest_asset, Manifest};
use crate::notes;
use crate::routes::RouteTemplate;
use crate::selector::{select_by_filename, select_by_platform, FilePreference};
use tagrelay_index::{
    ChannelFilter, ReleaseIndex, ReleaseQuery, TagConstraint, DEFAULT_FETCH_TIMEOUT,
};
use tagrelay_provider::{Asset, Release};
use tagrelay_utils::{GatewayError, Platform, Result, Version, STABLE_CHANNEL};

/// File type advertised to update checks that do not ask for one; the
/// Squirrel.Mac updater installs from zip archives.
pub const DEFAULT_UPDATE_FILETYPE: &str = "zip";

/// Channel name feeds use for "every channel".
pub const ALL_CHANNELS: &str = "all";

/// A download lookup. Absent fields take the defaults of the `/download`
/// routes: tag `latest`, channel `stable`, or every channel when a tag is
/// given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadRequest {
    pub channel: Option<String>,
    pub tag: Option<String>,
    pub platform: Option<Platform>,
    pub filename: Option<String>,
    pub filetype: Option<String>,
}

/// An update check as sent by an auto-updater. `platform` and `version`
/// are required; an absent channel means every channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub platform: Option<String>,
    pub version: Option<String>,
    pub channel: Option<String>,
    pub filetype: Option<String>,
}

/// JSON body returned to a client with an update pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateDescriptor {
    pub url: String,
    pub name: String,
    pub notes: String,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    Available(UpdateDescriptor),
    /// The client already runs the newest matching release.
    NoUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotesFormat {
    /// Markdown with a `## <tag>` header per release.
    #[default]
    Plain,
    /// `{"notes": ..., "pub_date": ...}` without headers.
    Json,
}

/// Answers download, update-check, manifest and notes requests from the
/// release index.
pub struct UpdateService {
    index: Arc<ReleaseIndex>,
    preferences: FilePreference,
    asset_timeout: Duration,
}

impl UpdateService {
    pub fn new(index: Arc<ReleaseIndex>) -> Self {
        Self {
            index,
            preferences: FilePreference::default(),
            asset_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_preferences(mut self, preferences: FilePreference) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_asset_timeout(mut self, asset_timeout: Duration) -> Self {
        self.asset_timeout = asset_timeout;
        self
    }

    pub fn index(&self) -> &Arc<ReleaseIndex> {
        &self.index
    }

    /// Resolve a download to a release and one of its assets.
    ///
    /// A request that names neither channel nor tag first looks at `stable`
    /// and widens to every channel when `stable` has nothing. A request that
    /// pins a channel or a tag is never widened.
    pub async fn resolve_download(&self, request: &DownloadRequest) -> Result<(Release, Asset)> {
        let tag: TagConstraint = match &request.tag {
            Some(tag) => tag.parse()?,
            None => TagConstraint::Any,
        };
        let channel = match (&request.channel, tag.is_any()) {
            (Some(channel), _) => ChannelFilter::named(channel),
            (None, true) => ChannelFilter::named(STABLE_CHANNEL),
            (None, false) => ChannelFilter::Any,
        };
        let platform = match (&request.filename, request.platform) {
            (Some(_), _) => None,
            (None, Some(platform)) => Some(platform),
            (None, None) => {
                return Err(GatewayError::bad_request(
                    "no platform specified and none could be detected",
                ))
            }
        };

        let query = ReleaseQuery::new().channel(channel).tag(tag).platform(platform);
        let mut releases = self.index.filter(&query).await?;
        let may_widen = request.channel.is_none() && query.tag.is_any();
        if releases.is_empty() && may_widen {
            tracing::debug!(%query, "no match on default channel, retrying on every channel");
            let widened = query.clone().channel(ChannelFilter::Any);
            releases = self.index.filter(&widened).await?;
        }
        let release = releases
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found(format!("no release matches {}", query)))?;

        let asset = match platform {
            Some(platform) => select_by_platform(
                &release,
                &platform,
                request.filetype.as_deref(),
                &self.preferences,
            )?,
            None => select_by_filename(&release, request.filename.as_deref().unwrap_or_default())?,
        }
        .clone();
        tracing::debug!(tag = %release.tag, filename = %asset.filename, "resolved download");
        Ok((release, asset))
    }

    fn client_of(request: &UpdateRequest) -> Result<(Platform, Version)> {
        let platform = request
            .platform
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| GatewayError::bad_request("requires \"platform\" parameter"))?;
        let platform = Platform::detect(platform)
            .ok_or_else(|| GatewayError::bad_request(format!("unknown platform '{}'", platform)))?;
        let version = request
            .version
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GatewayError::bad_request("requires \"version\" parameter"))?;
        let version = Version::parse(version)
            .ok_or_else(|| GatewayError::bad_request(format!("invalid version '{}'", version)))?;
        Ok((platform, version))
    }

    fn channel_of(request: &UpdateRequest) -> ChannelFilter {
        request
            .channel
            .as_deref()
            .map(ChannelFilter::named)
            .unwrap_or_default()
    }

    /// JSON update check.
    ///
    /// Notes are merged over every candidate strictly newer than the
    /// client's version, newest first.
    pub async fn check_update(
        &self,
        request: &UpdateRequest,
        routes: &RouteTemplate,
    ) -> Result<UpdateCheck> {
        let (platform, current) = Self::client_of(request)?;
        let query = ReleaseQuery::new()
            .channel(Self::channel_of(request))
            .tag(TagConstraint::at_least(current.clone()))
            .platform(Some(platform));
        let candidates = self.index.filter(&query).await?;

        let latest = match candidates.first() {
            Some(latest) => latest,
            None => {
                return Err(GatewayError::not_found(format!(
                    "no release matches {}",
                    query
                )))
            }
        };
        if *latest.version() == current {
            tracing::debug!(%platform, version = %current, "client is up to date");
            return Ok(UpdateCheck::NoUpdate);
        }

        let newer: Vec<Release> = candidates
            .iter()
            .filter(|release| *release.version() > current)
            .cloned()
            .collect();
        let filetype = request
            .filetype
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_UPDATE_FILETYPE);
        tracing::debug!(%platform, from = %current, to = %latest.tag, "update available");
        Ok(UpdateCheck::Available(UpdateDescriptor {
            url: routes.download_version(&latest.tag, &platform, Some(filetype)),
            name: latest.tag.clone(),
            notes: notes::merge(&newer, false),
            pub_date: latest.published_at,
        }))
    }

    /// Squirrel.Windows `RELEASES` of the newest release at or above the
    /// client's version, with every package routed through the gateway.
    pub async fn build_manifest(
        &self,
        request: &UpdateRequest,
        routes: &RouteTemplate,
    ) -> Result<Bytes> {
        let (platform, current) = Self::client_of(request)?;
        let query = ReleaseQuery::new()
            .channel(Self::channel_of(request))
            .tag(TagConstraint::at_least(current.clone()));
        let candidates = self.index.filter(&query).await?;
        if candidates.is_empty() {
            return Err(GatewayError::not_found(format!("no release matches {}", query)));
        }

        let (release, asset) = candidates
            .iter()
            .find_map(|release| {
                select_manifest_asset(release, &platform)
                    .ok()
                    .map(|asset| (release, asset))
            })
            .ok_or_else(|| {
                GatewayError::ManifestNotFound(format!(
                    "no release at or above {} ships a manifest for {}",
                    current, platform
                ))
            })?;

        let content = self.fetch_asset(asset).await?;
        let manifest = Manifest::parse(&content)?;
        let entries = rewrite(&manifest.entries, routes, &release.tag);
        tracing::debug!(
            tag = %release.tag,
            manifest = %asset.filename,
            entries = entries.len(),
            "rewrote manifest"
        );
        Ok(Bytes::from(manifest.with_entries(entries).generate()))
    }

    /// Byte content of `asset`, bounded by the asset timeout.
    pub async fn fetch_asset(&self, asset: &Asset) -> Result<Bytes> {
        let source = self.index.source();
        match tokio::time::timeout(self.asset_timeout, source.fetch_asset_bytes(&asset.reference)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::source_unavailable(format!(
                "fetching {} from {} timed out after {:?}",
                asset.filename,
                source.get_friendly_name(),
                self.asset_timeout
            ))),
        }
    }

    /// Cumulative notes of every release at or above `tag` (all releases
    /// when absent), across all channels.
    pub async fn release_notes(&self, tag: Option<&str>, format: NotesFormat) -> Result<String> {
        let constraint = match tag.filter(|t| !t.is_empty()) {
            Some(tag) => TagConstraint::at_least(
                Version::parse(tag)
                    .ok_or_else(|| GatewayError::bad_request(format!("invalid version '{}'", tag)))?,
            ),
            None => TagConstraint::Any,
        };
        let query = ReleaseQuery::new().tag(constraint);
        let releases = self.index.filter(&query).await?;
        let latest = releases
            .first()
            .ok_or_else(|| GatewayError::not_found(format!("no release matches {}", query)))?;

        Ok(match format {
            NotesFormat::Plain => notes::merge(&releases, true),
            NotesFormat::Json => json!({
                "notes": notes::merge(&releases, false),
                "pub_date": latest.published_at,
            })
            .to_string(),
        })
    }

    /// Releases of `channel` (`all` or `*` for every channel), highest
    /// version first.
    pub async fn list_for_feed(&self, channel: &str) -> Result<Vec<Release>> {
        let channel = if channel == ALL_CHANNELS {
            ChannelFilter::Any
        } else {
            ChannelFilter::named(channel)
        };
        self.index.filter(&ReleaseQuery::new().channel(channel)).await
    }

    /// Every release, newest published first.
    pub async fn list_releases(&self) -> Result<Vec<Release>> {
        self.index.list().await
    }

    /// `true` when the source has published at least one release.
    pub async fn is_healthy(&self) -> bool {
        match self.index.resolve(&ReleaseQuery::new()).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "health check found no release");
                false
            }
        }
    }
}
