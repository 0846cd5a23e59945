use std::net::SocketAddr;
use std::sync::Arc;

use tagrelay_config::{ConfigError, GatewayConfig};
use tagrelay_core::{FilePreference, RouteTemplate, UpdateService};
use tagrelay_index::ReleaseIndex;
use tagrelay_provider::ReleaseSource;
use tagrelay_server::GatewayServer;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A fully wired gateway: release index, update service and the address
/// and public URL it serves under.
pub struct Gateway {
    pub service: Arc<UpdateService>,
    pub public_url: Option<RouteTemplate>,
    pub listen: SocketAddr,
}

impl Gateway {
    /// Wire a gateway from `config`, building the backend it names.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, BoxError> {
        let source = config.backend.build_source()?;
        Self::with_source(config, source)
    }

    /// Wire a gateway from `config` around an already built release source.
    pub fn with_source(config: &GatewayConfig, source: Arc<dyn ReleaseSource>) -> Result<Self, BoxError> {
        let listen = config.listen_addr()?;
        let public_url = config
            .public_url
            .as_deref()
            .map(RouteTemplate::new)
            .transpose()?;

        let index = ReleaseIndex::new(source)
            .with_ttl(config.cache_ttl())
            .with_fetch_timeout(config.source_timeout());
        let preferences = config
            .file_preference
            .iter()
            .fold(FilePreference::new(), |prefs, (os, filetypes)| {
                prefs.with_override(*os, filetypes.clone())
            });
        let service = UpdateService::new(Arc::new(index))
            .with_preferences(preferences)
            .with_asset_timeout(config.source_timeout());

        Ok(Gateway {
            service: Arc::new(service),
            public_url,
            listen,
        })
    }

    /// Base for links printed outside a request: the public URL, or the
    /// listen address.
    pub fn routes(&self) -> Result<RouteTemplate, BoxError> {
        match &self.public_url {
            Some(routes) => Ok(routes.clone()),
            None => Ok(RouteTemplate::new(&format!("http://{}", self.listen))?),
        }
    }

    /// Fill the release cache once. A failure is logged and left for the
    /// first request to retry.
    pub async fn warm_up(&self) -> bool {
        let index = self.service.index();
        match index.refresh().await {
            Ok(snapshot) => {
                tracing::info!(
                    source = index.source().get_friendly_name(),
                    releases = snapshot.releases().len(),
                    "release cache warmed up"
                );
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "initial release fetch failed");
                false
            }
        }
    }

    pub async fn serve(self) -> Result<(), BoxError> {
        GatewayServer::new(self.service)
            .with_public_url(self.public_url)
            .start(self.listen)
            .await
    }
}

/// Command-line overrides applied after the config file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub public_url: Option<String>,
    pub cache_ttl_secs: Option<u64>,
}

/// Config file (when given), then environment, then `overrides`, validated.
pub fn load_config(
    path: Option<&std::path::Path>,
    overrides: &Overrides,
) -> Result<GatewayConfig, ConfigError> {
    let config = match path {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    let mut config = config.apply_env()?;
    if let Some(listen) = &overrides.listen {
        config.listen = listen.clone();
    }
    if let Some(public_url) = &overrides.public_url {
        config.public_url = Some(public_url.clone());
    }
    if let Some(ttl) = overrides.cache_ttl_secs {
        config.cache_ttl_secs = ttl;
    }
    config.validate()?;
    Ok(config)
}
