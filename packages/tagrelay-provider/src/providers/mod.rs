//! Release-hosting backends.

pub mod github;
pub mod gitlab;

pub use github::GitHubSource;
pub use gitlab::GitLabSource;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::Uri;
use std::collections::HashMap;

use tagrelay_utils::{
    get, get_following_redirects, http_status_is_ok, GatewayError, ResponseData, Result,
};

const USER_AGENT: &str = "tagrelay";

fn base_headers(token: Option<&str>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert("User-Agent".to_string(), USER_AGENT.to_string());
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        map.insert("Authorization".to_string(), format!("Bearer {}", token));
    }
    map
}

/// GET one page of an API listing.
async fn fetch_listing(url: &str, header_map: &HashMap<String, String>) -> Result<ResponseData> {
    let parsed_url = url
        .parse::<Uri>()
        .map_err(|e| GatewayError::source_unavailable(format!("invalid url {}: {}", url, e)))?;
    let rsp = get(parsed_url, header_map)
        .await
        .map_err(|e| GatewayError::source_unavailable(format!("GET {}: {}", url, e)))?;
    if !http_status_is_ok(rsp.status) {
        return Err(GatewayError::source_unavailable(format!(
            "GET {} answered {}",
            url, rsp.status
        )));
    }
    Ok(rsp)
}

/// GET asset content, following storage redirects.
async fn fetch_asset(url: &str, header_map: &HashMap<String, String>) -> Result<Bytes> {
    let parsed_url = url
        .parse::<Uri>()
        .map_err(|e| GatewayError::AssetNotFound(format!("invalid url {}: {}", url, e)))?;
    let rsp = get_following_redirects(parsed_url, header_map)
        .await
        .map_err(|e| GatewayError::source_unavailable(format!("GET {}: {}", url, e)))?;
    match rsp.status {
        404 | 410 => Err(GatewayError::AssetNotFound(url.to_string())),
        status if http_status_is_ok(status) => Ok(rsp.body.unwrap_or_default()),
        status => Err(GatewayError::source_unavailable(format!(
            "GET {} answered {}",
            url, status
        ))),
    }
}

fn parse_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
