use mockito::{Matcher, Server};
use tagrelay_provider::{GitLabSource, ReleaseSource};
use tagrelay_utils::GatewayError;

#[tokio::test]
async fn test_list_releases() {
    let mut server = Server::new_async().await;
    let body = r#"[
        {
            "tag_name": "v1.1.0",
            "description": "Second",
            "released_at": "2024-02-01T00:00:00Z",
            "assets": { "links": [
                { "id": 2, "name": "App-1.1.0-linux-x64.tar.gz", "url": "https://files.example.org/App-1.1.0-linux-x64.tar.gz", "link_type": "package" }
            ] }
        },
        {
            "tag_name": "v1.0.0",
            "description": "First",
            "released_at": "2024-01-01T00:00:00Z",
            "assets": { "links": [] }
        }
    ]"#;
    let _m = server
        .mock("GET", "/api/v4/projects/1234/releases")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer secret")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let source = GitLabSource::new("1234")
        .with_host(&server.url())
        .with_token(Some("secret".to_string()));
    let releases = source.list_releases().await.unwrap();

    assert_eq!(releases.len(), 2);
    assert_eq!(releases[0].tag, "v1.1.0");
    assert_eq!(releases[0].notes, "Second");
    assert_eq!(
        releases[0].assets[0].platform_key().as_deref(),
        Some("linux_64")
    );
    assert!(releases[1].assets.is_empty());
}

#[tokio::test]
async fn test_list_releases_unauthorized() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/api/v4/projects/42/releases")
        .match_query(Matcher::Any)
        .with_status(401)
        .create_async()
        .await;

    let source = GitLabSource::new("42").with_host(&server.url());
    let result = source.list_releases().await;
    assert!(matches!(result, Err(GatewayError::SourceUnavailable(_))));
}

#[tokio::test]
async fn test_list_releases_follows_next_page() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("GET", "/api/v4/projects/7/releases")
        .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
        .with_status(200)
        .with_header("x-next-page", "2")
        .with_body(r#"[{ "tag_name": "v2.0.0", "released_at": "2024-02-01T00:00:00Z", "assets": { "links": [] } }]"#)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/api/v4/projects/7/releases")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_header("x-next-page", "")
        .with_body(r#"[{ "tag_name": "v1.0.0", "released_at": "2024-01-01T00:00:00Z", "assets": { "links": [] } }]"#)
        .create_async()
        .await;

    let source = GitLabSource::new("7").with_host(&server.url());
    let tags: Vec<String> = source
        .list_releases()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.tag)
        .collect();

    assert_eq!(tags, vec!["v2.0.0", "v1.0.0"]);
    first.assert_async().await;
    second.assert_async().await;
}
