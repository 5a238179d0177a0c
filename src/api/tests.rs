use super::*;
use crate::config::Config;
use crate::embeddings::testing::HashingEmbedder;
use crate::llm::LanguageModel;
use axum::body::Body;
use axum::http::Request;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FixedModel(&'static str);

impl LanguageModel for FixedModel {
    fn model_name(&self) -> &str {
        "fixed"
    }

    fn complete(&self, _system: &str, _prompt: &str) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }
}

fn app(temp_dir: &TempDir, reply: &'static str) -> Router {
    let config = Config::load(temp_dir.path()).expect("default config should load");
    let service = ReportService::new(
        config,
        Arc::new(HashingEmbedder::new()),
        Arc::new(FixedModel(reply)),
        Vec::new(),
        None,
    )
    .expect("service should build");
    router(AppState::new(Arc::new(service), CancellationToken::new()))
}

fn request_body(callback_url: Option<&str>) -> Value {
    json!({
        "persona": {
            "name": "Tech Investor",
            "description": "Looks for opportunities",
            "interests": ["Acme"]
        },
        "companySize": "50-200",
        "industry": "SaaS",
        "region": "North America",
        "role": "VP of Sales",
        "ticker": "",
        "language": "en",
        "callback_url": callback_url
    })
}

fn post_json(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate-report")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

#[tokio::test]
async fn health_reports_ok() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let response = app(&temp_dir, "{}")
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("request should be served");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn synchronous_request_returns_report() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let response = app(&temp_dir, r#"{"final_summary": "Acme is growing."}"#)
        .oneshot(post_json(&request_body(None)))
        .await
        .expect("request should be served");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["json_report"], json!({"final_summary": "Acme is growing."}));
    assert_eq!(body["text_report"], "Acme is growing.");
    assert_eq!(body["repaired"], false);
    assert_eq!(body["request_payload"]["companySize"], "50-200");
    assert_eq!(body["request_payload"]["persona"]["interests"], json!(["Acme"]));
}

#[tokio::test]
async fn failed_generation_is_a_500_with_detail() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let response = app(&temp_dir, "no json here")
        .oneshot(post_json(&request_body(None)))
        .await
        .expect("request should be served");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    let detail = body["detail"].as_str().expect("detail should be a string");
    assert!(detail.contains("empty report"), "unexpected detail: {detail}");
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let response = app(&temp_dir, "{}")
        .oneshot(post_json(&json!({"persona": {"name": "x"}})))
        .await
        .expect("request should be served");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test(flavor = "multi_thread")]
async fn callback_request_returns_immediately_and_delivers() {
    let callback_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "json_report": {"final_summary": "Delivered."},
            "request_payload": {"role": "VP of Sales"}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&callback_server)
        .await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let callback_url = format!("{}/hook", callback_server.uri());
    let response = app(&temp_dir, r#"{"final_summary": "Delivered."}"#)
        .oneshot(post_json(&request_body(Some(&callback_url))))
        .await
        .expect("request should be served");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "processing");
    assert_eq!(body["message"], PROCESSING_MESSAGE);
    assert_eq!(body["request_payload"]["callback_url"], callback_url);

    let mut delivered = false;
    for _ in 0..100 {
        let received = callback_server
            .received_requests()
            .await
            .unwrap_or_default();
        if !received.is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(delivered, "callback should have been delivered");
}
