use bytes::Bytes;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use hyper::{header, HeaderMap, Method, StatusCode, Uri};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;

use tagrelay_core::{RouteTemplate, UpdateService};
use tagrelay_index::ReleaseIndex;
use tagrelay_provider::{Asset, Release, StaticSource};
use tagrelay_server::{GatewayServer, GatewayService};

const MAC_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15";

fn release(tag: &str, day: u32, notes: &str) -> Release {
    let url = |name: &str| format!("https://cdn.example.com/{}/{}", tag, name);
    Release::new(tag, Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap())
        .unwrap()
        .with_notes(notes)
        .with_assets([
            Asset::new("App.dmg", &url("App.dmg")),
            Asset::new("App-mac.zip", &url("App-mac.zip")),
            Asset::new("App-Setup.exe", &url("App-Setup.exe")),
            Asset::new("RELEASES", &url("RELEASES"))
                .with_reference(&format!("{}-RELEASES", tag), &url("RELEASES")),
        ])
}

fn service() -> GatewayService {
    let source = StaticSource::new(vec![
        release("v1.0.0", 1, "First"),
        release("v1.1.0", 2, "Second"),
        release("v1.2.0-beta.1", 3, "Beta"),
    ])
    .with_content("v1.1.0-RELEASES", "ABCDEF App-1.1.0-full.nupkg 1000\n");
    let index = Arc::new(ReleaseIndex::new(Arc::new(source)));
    GatewayService::new(Arc::new(UpdateService::new(index)), None)
}

fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(header::HOST, "updates.local:5000".parse().unwrap());
    for (name, value) in pairs {
        map.insert(name.clone(), value.parse().unwrap());
    }
    map
}

async fn get(service: &GatewayService, uri: &str, headers: &HeaderMap) -> (StatusCode, HeaderMap, Bytes) {
    let uri: Uri = uri.parse().unwrap();
    let response = service.respond(&Method::GET, &uri, headers).await;
    let status = response.status();
    let response_headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, response_headers, body)
}

fn location(headers: &HeaderMap) -> &str {
    headers.get(header::LOCATION).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn test_download_redirects_to_asset() {
    let service = service();

    let (status, h, _) = get(&service, "/download/osx", &headers(&[])).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location(&h), "https://cdn.example.com/v1.1.0/App.dmg");

    let (status, h, _) = get(&service, "/download/osx?filetype=zip", &headers(&[])).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location(&h), "https://cdn.example.com/v1.1.0/App-mac.zip");

    let (_, h, _) = get(&service, "/download/channel/beta/osx", &headers(&[])).await;
    assert_eq!(location(&h), "https://cdn.example.com/v1.2.0-beta.1/App.dmg");

    let (_, h, _) = get(&service, "/download/version/v1.0.0/win32", &headers(&[])).await;
    assert_eq!(location(&h), "https://cdn.example.com/v1.0.0/App-Setup.exe");

    let (_, h, _) = get(&service, "/download/1.0.0/App-Setup.exe", &headers(&[])).await;
    assert_eq!(location(&h), "https://cdn.example.com/v1.0.0/App-Setup.exe");
}

#[tokio::test]
async fn test_download_platform_from_user_agent() {
    let service = service();
    let (status, h, _) = get(&service, "/", &headers(&[(header::USER_AGENT, MAC_UA)])).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location(&h), "https://cdn.example.com/v1.1.0/App.dmg");

    let (status, _, _) = get(&service, "/", &headers(&[(header::USER_AGENT, "curl/8.4.0")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(&service, "/download/beos", &headers(&[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(&service, "/download/version/v9.0.0/osx", &headers(&[])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_check() {
    let service = service();

    let (status, h, body) = get(&service, "/update/osx/1.0.0", &headers(&[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.get(header::CONTENT_TYPE).unwrap(), "application/json");
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["name"], "v1.2.0-beta.1");
    assert_eq!(value["notes"], "Beta\nSecond\n");
    assert_eq!(
        value["url"],
        "http://updates.local:5000/download/version/v1.2.0-beta.1/osx_64?filetype=zip"
    );
    assert_eq!(value["pub_date"], "2024-03-03T09:00:00Z");

    let (status, _, body) = get(&service, "/update/channel/stable/osx/1.1.0", &headers(&[])).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, _, _) = get(&service, "/update/osx/5.0.0", &headers(&[])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = get(&service, "/update/osx/not-a-version", &headers(&[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_redirect() {
    let service = service();
    let (status, h, _) = get(&service, "/update?platform=osx&version=1.0.0", &headers(&[])).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location(&h), "/update/osx/1.0.0");

    let (status, _, _) = get(&service, "/update?version=1.0.0", &headers(&[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_manifest() {
    let service = service();
    let forwarded = headers(&[(header::HeaderName::from_static("x-forwarded-proto"), "https")]);
    let (status, h, body) = get(
        &service,
        "/update/channel/stable/win32/1.0.0/RELEASES?id=App&localVersion=1.0.0",
        &forwarded,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.get(header::CONTENT_TYPE).unwrap(), "application/octet-stream");
    assert_eq!(
        body,
        Bytes::from("ABCDEF https://updates.local:5000/download/1.1.0/App-1.1.0-full.nupkg 1000\n")
    );

    // the beta release ships a RELEASES entry without content
    let (status, _, _) = get(&service, "/update/win32/1.0.0/RELEASES", &headers(&[])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_notes() {
    let service = service();
    let (status, _, body) = get(&service, "/notes/1.1.0", &headers(&[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from("## v1.2.0-beta.1\nBeta\n\n## v1.1.0\nSecond\n\n"));

    let accept_json = headers(&[(header::ACCEPT, "application/json")]);
    let (status, _, body) = get(&service, "/notes/1.1.0", &accept_json).await;
    assert_eq!(status, StatusCode::OK);
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["notes"], "Beta\nSecond\n");
}

#[tokio::test]
async fn test_feed_versions_and_ping() {
    let service = service();

    let (status, h, body) = get(&service, "/feed/channel/all.atom", &headers(&[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        h.get(header::CONTENT_TYPE).unwrap(),
        "application/atom+xml; charset=utf-8"
    );
    let xml = String::from_utf8(body.to_vec()).unwrap();
    assert_eq!(xml.matches("<entry>").count(), 3);
    assert!(xml.contains("http://updates.local:5000/download/version/v1.1.0"));

    let (_, _, body) = get(&service, "/feed/channel/stable.atom", &headers(&[])).await;
    let xml = String::from_utf8(body.to_vec()).unwrap();
    assert_eq!(xml.matches("<entry>").count(), 2);

    let (status, _, body) = get(&service, "/versions", &headers(&[])).await;
    assert_eq!(status, StatusCode::OK);
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 3);
    assert_eq!(value[0]["tag"], "v1.2.0-beta.1");

    let (status, _, body) = get(&service, "/ping", &headers(&[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from("OK"));

    let (status, _, _) = get(&service, "/api/versions", &headers(&[])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_public_url_and_methods() {
    let source = StaticSource::new(vec![release("v1.0.0", 1, "First")]);
    let index = Arc::new(ReleaseIndex::new(Arc::new(source)));
    let service = GatewayService::new(
        Arc::new(UpdateService::new(index)),
        Some(RouteTemplate::new("https://dl.example.org/app/").unwrap()),
    );

    let feed = get(&service, "/feed/channel/all.atom", &headers(&[])).await.2;
    let xml = String::from_utf8(feed.to_vec()).unwrap();
    assert!(xml.contains("https://dl.example.org/app/download/version/v1.0.0"));

    let uri: Uri = "/ping".parse().unwrap();
    let response = service.respond(&Method::POST, &uri, &headers(&[])).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_serve_over_tcp() {
    let source = StaticSource::new(vec![release("v1.0.0", 1, "First")]);
    let index = Arc::new(ReleaseIndex::new(Arc::new(source)));
    let server = GatewayServer::new(Arc::new(UpdateService::new(index)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));

    let url: Uri = format!("http://{}/ping", addr).parse().unwrap();
    let rsp = tagrelay_utils::get(url, &HashMap::new()).await.unwrap();
    assert_eq!(rsp.status, 200);
    assert_eq!(rsp.body.unwrap(), Bytes::from("OK"));

    let url: Uri = format!("http://{}/download/osx", addr).parse().unwrap();
    let rsp = tagrelay_utils::get(url, &HashMap::new()).await.unwrap();
    assert_eq!(rsp.status, 302);
    assert_eq!(rsp.location.as_deref(), Some("https://cdn.example.com/v1.0.0/App.dmg"));
}
