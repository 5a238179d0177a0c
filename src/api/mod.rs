// HTTP surface
// POST /generate-report (synchronous or with a callback) and GET /health

#[cfg(test)]
mod tests;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::http::{agent_with_timeout, request_with_retry};
use crate::report::{ReportRequest, ReportService};

const PROCESSING_MESSAGE: &str = "Report will be sent to callback URL shortly.";

#[derive(Clone)]
pub struct AppState {
    service: Arc<ReportService>,
    shutdown: CancellationToken,
    callback_agent: ureq::Agent,
}

impl AppState {
    #[inline]
    pub fn new(service: Arc<ReportService>, shutdown: CancellationToken) -> Self {
        let timeout = Duration::from_secs(service.config().sources.timeout_seconds);
        Self {
            service,
            shutdown,
            callback_agent: agent_with_timeout(timeout),
        }
    }
}

/// Error body: `{"detail": message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/generate-report", post(generate_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
#[inline]
pub async fn serve(
    service: Arc<ReportService>,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(AppState::new(service, shutdown.clone()));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}", addr);
    info!("  POST /generate-report");
    info!("  GET  /health");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn generate_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> Result<Json<Value>, ApiError> {
    let request_payload =
        serde_json::to_value(&request).map_err(|e| ApiError::internal(e.to_string()))?;

    if let Some(callback_url) = request.callback_url.clone() {
        info!("Queued report for callback to {}", callback_url);
        let payload = request_payload.clone();
        tokio::spawn(async move {
            generate_and_deliver(state, request, payload, callback_url).await;
        });

        return Ok(Json(json!({
            "status": "processing",
            "message": PROCESSING_MESSAGE,
            "request_payload": request_payload,
        })));
    }

    let outcome = state
        .service
        .generate(&request, &state.shutdown)
        .await
        .map_err(|e| {
            error!("Report generation failed: {}", e);
            ApiError::internal(e.to_string())
        })?;

    let text_report = outcome.text_report().to_string();
    Ok(Json(json!({
        "request_payload": request_payload,
        "json_report": outcome.report.into_value(),
        "text_report": text_report,
        "repaired": outcome.repaired,
    })))
}

async fn generate_and_deliver(
    state: AppState,
    request: ReportRequest,
    request_payload: Value,
    callback_url: String,
) {
    let outcome = match state.service.generate(&request, &state.shutdown).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Background report generation failed: {}", e);
            return;
        }
    };

    let body = json!({
        "request_payload": request_payload,
        "json_report": outcome.report.into_value(),
    })
    .to_string();

    let agent = state.callback_agent.clone();
    let target = callback_url.clone();
    let delivery = tokio::task::spawn_blocking(move || {
        request_with_retry(&target, 1, || {
            agent
                .post(&target)
                .header("Content-Type", "application/json")
                .send(&body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    })
    .await;

    match delivery {
        Ok(Ok(_)) => info!("Delivered report to {}", callback_url),
        Ok(Err(e)) => warn!("Callback to {} failed: {:#}", callback_url, e),
        Err(e) => warn!("Callback task for {} failed: {}", callback_url, e),
    }
}
