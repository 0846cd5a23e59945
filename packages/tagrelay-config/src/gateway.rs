use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use tagrelay_provider::{GitHubSource, GitLabSource, ReleaseSource};
use tagrelay_utils::Os;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 15 * 60;
pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LISTEN: &str = "127.0.0.1:5000";

/// Release-hosting backend and its coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Github {
        /// `owner/repo`
        repository: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_url: Option<String>,
    },
    Gitlab {
        /// Numeric id or `group/project` path.
        project: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Github {
            repository: String::new(),
            token: None,
            api_url: None,
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            BackendConfig::Github { repository, .. } => {
                let valid = repository
                    .split_once('/')
                    .map_or(false, |(owner, repo)| {
                        !owner.is_empty() && !repo.is_empty() && !repo.contains('/')
                    });
                if !valid {
                    return Err(ConfigError::Invalid(format!(
                        "github repository must be 'owner/repo', got '{}'",
                        repository
                    )));
                }
            }
            BackendConfig::Gitlab { project, .. } => {
                if project.trim().is_empty() {
                    return Err(ConfigError::Invalid("gitlab project is not set".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Instantiate the release source this backend describes.
    pub fn build_source(&self) -> Result<Arc<dyn ReleaseSource>, ConfigError> {
        self.validate()?;
        let source: Arc<dyn ReleaseSource> = match self {
            BackendConfig::Github {
                repository,
                token,
                api_url,
            } => {
                let mut source = GitHubSource::from_slug(repository)
                    .ok_or_else(|| ConfigError::Invalid(format!("invalid repository '{}'", repository)))?
                    .with_token(token.clone());
                if let Some(api_url) = api_url {
                    source = source.with_api_url(api_url);
                }
                Arc::new(source)
            }
            BackendConfig::Gitlab {
                project,
                token,
                host,
            } => {
                let mut source = GitLabSource::new(project).with_token(token.clone());
                if let Some(host) = host {
                    source = source.with_host(host);
                }
                Arc::new(source)
            }
        };
        Ok(source)
    }
}

/// Gateway settings. Every field has a default, so an empty JSON object is
/// a valid (if backend-less) configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub backend: BackendConfig,
    pub cache_ttl_secs: u64,
    pub source_timeout_secs: u64,
    /// Fetch the release list once at startup.
    pub pre_fetch: bool,
    pub listen: String,
    /// Absolute base URL for links handed to clients. Derived from the
    /// request's `Host` header when unset.
    pub public_url: Option<String>,
    /// Per-OS override of the asset file-type preference.
    pub file_preference: BTreeMap<Os, Vec<String>>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            source_timeout_secs: DEFAULT_SOURCE_TIMEOUT_SECS,
            pre_fetch: true,
            listen: DEFAULT_LISTEN.to_string(),
            public_url: None,
            file_preference: BTreeMap::new(),
        }
    }
}

impl GatewayConfig {
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&content)?;
        tracing::debug!(path = %path.display(), "loaded gateway config");
        Ok(config)
    }

    /// Overlay the process environment, see [`GatewayConfig::apply_env_from`].
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay variables looked up through `var`.
    ///
    /// `GITHUB_REPO` selects the GitHub backend, `GITLAB_PROJECT` the GitLab
    /// one; `GITHUB_TOKEN`, `GITLAB_TOKEN` and `GITLAB_HOST` fill in the
    /// matching backend only. `TAGRELAY_PUBLIC_URL`, `TAGRELAY_CACHE_TTL`
    /// (seconds) and `TAGRELAY_LISTEN` override the gateway settings.
    pub fn apply_env_from<F>(mut self, var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(repository) = var("GITHUB_REPO") {
            self.backend = BackendConfig::Github {
                repository,
                token: None,
                api_url: None,
            };
        } else if let Some(project) = var("GITLAB_PROJECT") {
            self.backend = BackendConfig::Gitlab {
                project,
                token: None,
                host: None,
            };
        }
        match &mut self.backend {
            BackendConfig::Github { token, .. } => {
                if let Some(value) = var("GITHUB_TOKEN") {
                    *token = Some(value);
                }
            }
            BackendConfig::Gitlab { token, host, .. } => {
                if let Some(value) = var("GITLAB_TOKEN") {
                    *token = Some(value);
                }
                if let Some(value) = var("GITLAB_HOST") {
                    *host = Some(value);
                }
            }
        }

        if let Some(public_url) = var("TAGRELAY_PUBLIC_URL") {
            self.public_url = Some(public_url);
        }
        if let Some(ttl) = var("TAGRELAY_CACHE_TTL") {
            self.cache_ttl_secs = ttl.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("TAGRELAY_CACHE_TTL must be seconds, got '{}'", ttl))
            })?;
        }
        if let Some(listen) = var("TAGRELAY_LISTEN") {
            self.listen = listen;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend.validate()?;
        self.listen_addr()?;
        if let Some(url) = &self.public_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "public_url must be an absolute http(s) url, got '{}'",
                    url
                )));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid listen address '{}'", self.listen)))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}
