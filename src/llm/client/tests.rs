use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> LlmConfig {
    LlmConfig {
        base_url: format!("{}/v1/", server.uri()),
        model: "test-model".to_string(),
        temperature: 0.3,
        max_tokens: Some(256),
        timeout_seconds: 5,
        api_key_env: "UNUSED_TEST_KEY".to_string(),
    }
}

#[test]
fn endpoint_joins_base_url() {
    let config = LlmConfig {
        base_url: "https://api.example.com/openai/v1/".to_string(),
        ..LlmConfig::default()
    };
    let client = ChatClient::new(&config, "key".to_string());
    assert_eq!(
        client.endpoint(),
        "https://api.example.com/openai/v1/chat/completions"
    );
    assert_eq!(client.model_name(), config.model);
}

#[tokio::test(flavor = "multi_thread")]
async fn complete_returns_first_choice_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "max_tokens": 256,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"final_summary\": \"ok\"}"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&config_for(&server), "secret".to_string());
    let content = tokio::task::spawn_blocking(move || client.complete("be brief", "hello"))
        .await
        .expect("task should join")
        .expect("completion should succeed");

    assert_eq!(content, "{\"final_summary\": \"ok\"}");
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&config_for(&server), "secret".to_string());
    let result = tokio::task::spawn_blocking(move || client.complete("s", "p"))
        .await
        .expect("task should join");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_choices_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let client = ChatClient::new(&config_for(&server), "secret".to_string());
    let error = tokio::task::spawn_blocking(move || client.complete("s", "p"))
        .await
        .expect("task should join")
        .expect_err("empty choices should fail");

    assert!(error.to_string().contains("no message content"));
}

#[test]
fn from_config_requires_key() {
    let config = LlmConfig {
        api_key_env: "MARKET_BRIEF_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
        ..LlmConfig::default()
    };
    assert!(matches!(
        ChatClient::from_config(&config),
        Err(ConfigError::MissingCredential(_))
    ));
}
