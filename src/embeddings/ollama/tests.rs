use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, batch_size: u32, dimension: u32) -> OllamaConfig {
    let url = Url::parse(&server.uri()).expect("mock server uri should parse");
    OllamaConfig {
        protocol: "http".to_string(),
        host: url.host_str().unwrap_or("127.0.0.1").to_string(),
        port: url.port().unwrap_or(80),
        model: "test-model".to_string(),
        batch_size,
        embedding_dimension: dimension,
    }
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        embedding_dimension: 384,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.dimension(), 384);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
    assert_eq!(client.model_name(), "all-minilm:latest");
}

#[test]
fn empty_input_makes_no_request() {
    let config = OllamaConfig {
        host: "unreachable.invalid".to_string(),
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    let embeddings = client.embed_batch(&[]).expect("empty batch should succeed");
    assert!(embeddings.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn embeds_in_configured_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "model": "test-model" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0, 0.0, 0.0]] })),
        )
        .expect(3)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 1, 3)).expect("Failed to create client");
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let embeddings = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("blocking task should join")
        .expect("embedding should succeed");

    assert_eq!(embeddings.len(), 3);
    assert!(embeddings.iter().all(|e| e == &vec![1.0, 0.0, 0.0]));
}

#[tokio::test(flavor = "multi_thread")]
async fn count_mismatch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0, 0.0, 0.0]] })),
        )
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 8, 3)).expect("Failed to create client");
    let texts = vec!["a".to_string(), "b".to_string()];

    let result = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("blocking task should join");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn dimension_mismatch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0, 0.0]] })),
        )
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 8, 3)).expect("Failed to create client");

    let result = tokio::task::spawn_blocking(move || client.embed("a"))
        .await
        .expect("blocking task should join");

    let message = format!("{:#}", result.expect_err("dimension mismatch should fail"));
    assert!(message.contains("expected 3"), "unexpected error: {message}");
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_model_against_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "other-model" }, { "name": "test-model", "size": 45 }]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 8, 3)).expect("Failed to create client");

    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("blocking task should join");
    assert!(result.is_ok(), "health check failed: {result:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_model_fails_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "models": [{ "name": "other" }] })),
        )
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 8, 3)).expect("Failed to create client");

    let result = tokio::task::spawn_blocking(move || client.validate_model())
        .await
        .expect("blocking task should join");
    assert!(result.is_err());
}
