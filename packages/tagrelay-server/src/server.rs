use hyper::{
    body::Bytes, header, service::Service, HeaderMap, Method, Request, Response, StatusCode, Uri,
};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::agent::detect_platform;
use crate::feed::render_atom;
use crate::router::{query_param, Route};
use tagrelay_core::{
    DownloadRequest, NotesFormat, RouteTemplate, UpdateCheck, UpdateRequest, UpdateService,
    ALL_CHANNELS,
};
use tagrelay_utils::{GatewayError, Platform};

type Body = http_body_util::Full<Bytes>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct GatewayServer {
    service: Arc<UpdateService>,
    public_url: Option<RouteTemplate>,
}

impl GatewayServer {
    pub fn new(service: Arc<UpdateService>) -> Self {
        Self {
            service,
            public_url: None,
        }
    }

    /// Base of every link handed to clients. Without it, links are built
    /// from each request's `Host` header.
    pub fn with_public_url(mut self, public_url: Option<RouteTemplate>) -> Self {
        self.public_url = public_url;
        self
    }

    pub async fn start(self, addr: SocketAddr) -> Result<(), BoxError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<(), BoxError> {
        tracing::info!(addr = %listener.local_addr()?, "gateway listening");
        let service = GatewayService::new(self.service, self.public_url);

        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let service = service.clone();

            tokio::spawn(async move {
                if let Err(err) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    tracing::debug!(%peer, error = ?err, "error serving connection");
                }
            });
        }
    }
}

#[derive(Clone)]
pub struct GatewayService {
    service: Arc<UpdateService>,
    public_url: Option<Arc<RouteTemplate>>,
}

impl Service<Request<hyper::body::Incoming>> for GatewayService {
    type Response = Response<Body>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<hyper::body::Incoming>) -> Self::Future {
        let this = self.clone();

        Box::pin(async move {
            let response = this.respond(req.method(), req.uri(), req.headers()).await;
            tracing::info!(
                method = %req.method(),
                uri = %req.uri(),
                status = response.status().as_u16(),
                "request"
            );
            Ok(response)
        })
    }
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Result<Response<Body>, BoxError> {
    Ok(Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body.into()))?)
}

fn redirect(location: &str) -> Result<Response<Body>, BoxError> {
    Ok(Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .body(Body::default())?)
}

fn json(body: String) -> Result<Response<Body>, BoxError> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))?)
}

fn error_response(err: BoxError) -> Response<Body> {
    let status = err
        .downcast_ref::<GatewayError>()
        .and_then(|e| StatusCode::from_u16(e.status_code()).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::warn!(error = %err, "request failed");
    } else {
        tracing::debug!(error = %err, "request rejected");
    }
    let mut response = Response::new(Body::from(err.to_string()));
    *response.status_mut() = status;
    response
}

/// `osx`, `win64`, ... from a path or query parameter. An unreadable name is
/// a client error, not a reason to fall back to the user agent.
fn explicit_platform(name: Option<String>) -> Result<Option<Platform>, GatewayError> {
    match name {
        Some(name) => Platform::detect(&name)
            .map(Some)
            .ok_or_else(|| GatewayError::bad_request(format!("unknown platform '{}'", name))),
        None => Ok(None),
    }
}

impl GatewayService {
    pub fn new(service: Arc<UpdateService>, public_url: Option<RouteTemplate>) -> Self {
        Self {
            service,
            public_url: public_url.map(Arc::new),
        }
    }

    /// Answer one request. Failures become status-coded plain-text bodies.
    pub async fn respond(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Response<Body> {
        if method != Method::GET && method != Method::HEAD {
            return text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
                .unwrap_or_else(error_response);
        }
        match Route::parse(uri.path()) {
            Some(route) => self
                .dispatch(route, uri.query(), headers)
                .await
                .unwrap_or_else(error_response),
            None => text(StatusCode::NOT_FOUND, "Not found").unwrap_or_else(error_response),
        }
    }

    fn routes_for(&self, headers: &HeaderMap) -> Result<RouteTemplate, GatewayError> {
        if let Some(public_url) = &self.public_url {
            return Ok(public_url.as_ref().clone());
        }
        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| GatewayError::bad_request("missing Host header"))?;
        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|h| h.to_str().ok())
            .unwrap_or("http");
        RouteTemplate::new(&format!("{}://{}", scheme, host))
    }

    async fn dispatch(
        &self,
        route: Route,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<Response<Body>, BoxError> {
        match route {
            Route::Download {
                channel,
                tag,
                platform,
            } => {
                let named = platform.or_else(|| query_param(query, "platform"));
                let platform = match explicit_platform(named)? {
                    Some(platform) => Some(platform),
                    None => headers
                        .get(header::USER_AGENT)
                        .and_then(|ua| ua.to_str().ok())
                        .and_then(detect_platform),
                };
                let request = DownloadRequest {
                    channel,
                    tag,
                    platform,
                    filename: None,
                    filetype: query_param(query, "filetype"),
                };
                let (_, asset) = self.service.resolve_download(&request).await?;
                redirect(&asset.download_url)
            }
            Route::DownloadFile { tag, filename } => {
                let request = DownloadRequest {
                    tag: Some(tag),
                    filename: Some(filename),
                    ..Default::default()
                };
                let (_, asset) = self.service.resolve_download(&request).await?;
                redirect(&asset.download_url)
            }
            Route::UpdateRedirect => {
                let platform = query_param(query, "platform")
                    .ok_or_else(|| GatewayError::bad_request("requires \"platform\" parameter"))?;
                let version = query_param(query, "version")
                    .ok_or_else(|| GatewayError::bad_request("requires \"version\" parameter"))?;
                redirect(&format!(
                    "/update/{}/{}",
                    urlencoding::encode(&platform),
                    urlencoding::encode(&version)
                ))
            }
            Route::Update {
                channel,
                platform,
                version,
            } => {
                let request = UpdateRequest {
                    platform: Some(platform),
                    version: Some(version),
                    channel,
                    filetype: query_param(query, "filetype"),
                };
                let routes = self.routes_for(headers)?;
                match self.service.check_update(&request, &routes).await? {
                    UpdateCheck::Available(descriptor) => json(serde_json::to_string(&descriptor)?),
                    UpdateCheck::NoUpdate => Ok(Response::builder()
                        .status(StatusCode::NO_CONTENT)
                        .body(Body::default())?),
                }
            }
            Route::UpdateManifest {
                channel,
                platform,
                version,
            } => {
                let request = UpdateRequest {
                    platform: Some(platform),
                    version: Some(version),
                    channel,
                    filetype: None,
                };
                let routes = self.routes_for(headers)?;
                let manifest = self.service.build_manifest(&request, &routes).await?;
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "application/octet-stream")
                    .header(header::CONTENT_DISPOSITION, "attachment; filename=\"RELEASES\"")
                    .header(header::CONTENT_LENGTH, manifest.len())
                    .body(Body::from(manifest))?)
            }
            Route::Notes { version } => {
                let wants_json = headers
                    .get(header::ACCEPT)
                    .and_then(|a| a.to_str().ok())
                    .map_or(false, |a| a.contains("application/json"));
                let format = if wants_json {
                    NotesFormat::Json
                } else {
                    NotesFormat::Plain
                };
                let notes = self.service.release_notes(version.as_deref(), format).await?;
                match format {
                    NotesFormat::Json => json(notes),
                    NotesFormat::Plain => text(StatusCode::OK, notes),
                }
            }
            Route::Feed { channel } => {
                let releases = self.service.list_for_feed(&channel).await?;
                let routes = self.routes_for(headers)?;
                let channel = if channel == "*" { ALL_CHANNELS } else { channel.as_str() };
                let xml = render_atom(channel, &releases, &routes)?;
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "application/atom+xml; charset=utf-8")
                    .body(Body::from(xml))?)
            }
            Route::Versions => {
                let releases = self.service.list_releases().await?;
                json(serde_json::to_string(&releases)?)
            }
            Route::Ping => {
                if self.service.is_healthy().await {
                    text(StatusCode::OK, "OK")
                } else {
                    text(StatusCode::INTERNAL_SERVER_ERROR, "no release available")
                }
            }
        }
    }
}
