use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{header, HeaderMap, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use once_cell::sync::Lazy;
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, ConfigBuilder, WantsVerifier};
use std::collections::HashMap;
use std::sync::Arc;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Redirect hops followed by [`get_following_redirects`].
pub const MAX_REDIRECTS: usize = 5;

static CRYPTO: Lazy<Arc<CryptoProvider>> =
    Lazy::new(|| Arc::new(rustls::crypto::ring::default_provider()));

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: u16,
    pub headers: HeaderMap,
    pub location: Option<String>,
    pub body: Option<Bytes>,
}

#[cfg(feature = "rustls-platform-verifier")]
fn trust_roots(builder: ConfigBuilder<ClientConfig, WantsVerifier>) -> Result<ClientConfig, BoxError> {
    use rustls_platform_verifier::BuilderVerifierExt;
    Ok(builder.with_platform_verifier()?.with_no_client_auth())
}

#[cfg(all(feature = "webpki-roots", not(feature = "rustls-platform-verifier")))]
fn trust_roots(builder: ConfigBuilder<ClientConfig, WantsVerifier>) -> Result<ClientConfig, BoxError> {
    use hyper_rustls::ConfigBuilderExt;
    Ok(builder.with_webpki_roots().with_no_client_auth())
}

#[cfg(all(
    not(feature = "webpki-roots"),
    not(feature = "rustls-platform-verifier")
))]
fn trust_roots(builder: ConfigBuilder<ClientConfig, WantsVerifier>) -> Result<ClientConfig, BoxError> {
    use hyper_rustls::ConfigBuilderExt;
    Ok(builder.with_native_roots()?.with_no_client_auth())
}

/// TLS connector over the configured trust roots.
fn tls_connector() -> Result<HttpsConnector<HttpConnector>, BoxError> {
    let builder = ClientConfig::builder_with_provider(CRYPTO.clone())
        .with_safe_default_protocol_versions()?;
    Ok(hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(trust_roots(builder)?)
        .https_only()
        .enable_http1()
        .enable_http2()
        .build())
}

/// One GET with the given headers. The body is read in full.
pub async fn get(url: Uri, header_map: &HashMap<String, String>) -> Result<ResponseData, BoxError> {
    let tls = url.scheme_str() == Some("https");
    let request = header_map
        .iter()
        .fold(
            hyper::Request::builder().method("GET").uri(url),
            |request, (key, value)| request.header(key, value),
        )
        .body(Empty::<Bytes>::new())?;

    let response = if tls {
        let client = Client::builder(TokioExecutor::new()).build(tls_connector()?);
        client.request(request).await?
    } else {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        client.request(request).await?
    };

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.into_body().collect().await?.to_bytes();
    Ok(ResponseData {
        status,
        headers,
        location,
        body: Some(body),
    })
}

/// GET that follows `Location` headers of 3xx answers, up to [`MAX_REDIRECTS`]
/// hops. Release hosts commonly answer asset downloads with a redirect to
/// blob storage.
///
/// `Authorization` is only sent to the authority of the first request; signed
/// blob-storage URLs reject it.
pub async fn get_following_redirects(
    url: Uri,
    header_map: &HashMap<String, String>,
) -> Result<ResponseData, BoxError> {
    let origin = url.authority().cloned();
    let mut url = url;
    let mut headers = header_map.clone();
    for _ in 0..=MAX_REDIRECTS {
        let rsp = get(url.clone(), &headers).await?;
        let is_redirect = StatusCode::from_u16(rsp.status).map_or(false, |s| s.is_redirection());
        match (is_redirect, rsp.location.as_deref()) {
            (true, Some(location)) => {
                url = resolve_location(&url, location)?;
                if url.authority() != origin.as_ref() {
                    headers.retain(|k, _| !k.eq_ignore_ascii_case("authorization"));
                }
                tracing::debug!(%url, "following redirect");
            }
            _ => return Ok(rsp),
        }
    }
    Err(format!("too many redirects fetching {}", url).into())
}

fn resolve_location(base: &Uri, location: &str) -> Result<Uri, BoxError> {
    let target: Uri = location.parse()?;
    if target.scheme().is_some() {
        return Ok(target);
    }
    let mut parts = base.clone().into_parts();
    parts.path_and_query = target.path_and_query().cloned();
    Ok(Uri::from_parts(parts)?)
}

/// Anything below 400.
pub fn http_status_is_ok(status: u16) -> bool {
    StatusCode::from_u16(status).map_or(false, |s| !(s.is_client_error() || s.is_server_error()))
}
