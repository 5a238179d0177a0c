#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Collectors against fake HTTP endpoints, feeding the chunk assembler

use market_brief::assembler::ChunkAssembler;
use market_brief::config::SourcesConfig;
use market_brief::sources::{ArticleStore, RedditClient, SocialTrend, SourceCollector, SourceKind};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reddit_listing() -> serde_json::Value {
    json!({
        "data": {
            "children": [
                {"data": {
                    "id": "a1",
                    "title": "Acme just raised a Series B",
                    "subreddit": "startups",
                    "score": 120,
                    "created_utc": 1_700_000_000.0,
                    "url": "https://acme.example/news",
                    "permalink": "/r/startups/comments/a1/",
                    "selftext": "Thoughts on the valuation?"
                }},
                {"data": {
                    "id": "a2",
                    "title": "Is Acme hiring?",
                    "subreddit": "jobs",
                    "score": 15,
                    "created_utc": 1_700_000_100.0,
                    "url": "",
                    "permalink": "/r/jobs/comments/a2/",
                    "selftext": ""
                }}
            ]
        }
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn reddit_collection_feeds_assembler() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("q", "Acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reddit_listing()))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArticleStore::new(temp_dir.path().join("articles"));
    let config = SourcesConfig {
        reddit_url: format!("{}/search.json", server.uri()),
        retry_attempts: 1,
        ..SourcesConfig::default()
    };

    let collector = RedditClient::new(&config);
    let task_store = store.clone();
    let written = tokio::task::spawn_blocking(move || collector.collect("Acme", &task_store))
        .await
        .expect("task should join")
        .expect("collection should succeed");
    assert_eq!(written, 2);

    let trend: SocialTrend = store
        .load("Acme", SourceKind::SocialTrends)
        .expect("trend file should parse")
        .expect("trend file should exist");
    assert_eq!(trend.post_count, 2);
    assert!((trend.average_score - 67.5).abs() < f64::EPSILON);
    assert_eq!(trend.top_titles[0], "Acme just raised a Series B");

    let chunks = ChunkAssembler::new(store, 500)
        .expect("should create assembler")
        .assemble(&["Acme".to_string()]);
    let sources: Vec<SourceKind> = chunks.iter().map(|c| c.source).collect();
    assert_eq!(
        sources,
        vec![SourceKind::Reddit, SourceKind::Reddit, SourceKind::SocialTrends]
    );
    assert_eq!(
        chunks[0].text,
        "[Reddit Post] Acme just raised a Series B Thoughts on the valuation?"
    );
    assert!(chunks[2].text.starts_with("[Social Trend Summary for 'Acme'] Post Count: 2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_source_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArticleStore::new(temp_dir.path().join("articles"));
    let config = SourcesConfig {
        reddit_url: format!("{}/search.json", server.uri()),
        ..SourcesConfig::default()
    };

    let collector = RedditClient::new(&config);
    let task_store = store.clone();
    let result = tokio::task::spawn_blocking(move || collector.collect("Acme", &task_store))
        .await
        .expect("task should join");
    assert!(result.is_err());

    let chunks = ChunkAssembler::new(store, 500)
        .expect("should create assembler")
        .assemble(&["Acme".to_string()]);
    assert!(chunks.is_empty());
}
