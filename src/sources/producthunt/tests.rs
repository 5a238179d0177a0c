use super::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn search_url_is_derived_from_app_id() {
    let client = ProductHuntClient::new(&SourcesConfig::default(), "0H4SMABBSG", "key".to_string())
        .expect("should build client");
    assert_eq!(
        client.search_url().as_str(),
        "https://0h4smabbsg-dsn.algolia.net/1/indexes/Post_production"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn collect_keeps_top_hits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/indexes/Post_production"))
        .and(query_param("query", "Acme"))
        .and(header("X-Algolia-API-Key", "test-key"))
        .and(header("X-Algolia-Application-Id", "APPID"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [
                { "name": "Acme Rockets", "tagline": "Fast delivery", "url": "https://ph.example/acme", "votesCount": 321 },
                { "name": "Acme Anvils", "tagline": null, "url": "https://ph.example/anvil" },
                { "name": "Acme Extra", "tagline": "Over the limit", "url": "https://ph.example/extra", "votesCount": 1 }
            ],
            "nbHits": 3
        })))
        .mount(&server)
        .await;

    let config = SourcesConfig {
        producthunt_url: Some(format!("{}/1/indexes/Post_production", server.uri())),
        producthunt_limit: 2,
        retry_attempts: 1,
        ..SourcesConfig::default()
    };
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArticleStore::new(temp_dir.path());
    let client =
        ProductHuntClient::new(&config, "APPID", "test-key".to_string()).expect("should build");

    let collect_store = store.clone();
    let written = tokio::task::spawn_blocking(move || client.collect("Acme", &collect_store))
        .await
        .expect("blocking task should join")
        .expect("collect should succeed");
    assert_eq!(written, 2);

    let launches: Vec<ProductLaunch> = store
        .load("Acme", SourceKind::ProductHunt)
        .expect("should load")
        .expect("file should exist");
    assert_eq!(launches[0].votes, 321);
    assert_eq!(launches[1].name, "Acme Anvils");
    assert!(launches[1].tagline.is_empty());
    assert_eq!(launches[1].votes, 0);
}
