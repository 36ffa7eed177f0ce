//! Axum ingress for the webhook pipeline.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use super::pipeline::{HandlerOutcome, WebhookPipeline, WebhookResponse};

/// Header carrying the base64 HMAC-SHA256 signature of the body.
pub const SIGNATURE_HEADER: &str = "x-webhook-hmacsha256-signature";

/// Router exposing `POST /webhooks/billing` backed by the pipeline.
#[must_use]
pub fn webhook_router(pipeline: Arc<WebhookPipeline>) -> Router {
    Router::new()
        .route("/webhooks/billing", post(receive))
        .with_state(pipeline)
}

async fn receive(
    State(pipeline): State<Arc<WebhookPipeline>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match pipeline.ingest(&body, signature).await {
        WebhookResponse::Received { event, outcome } => {
            let status = match outcome {
                HandlerOutcome::Handled => "handled",
                HandlerOutcome::Failed => "accepted",
                HandlerOutcome::AlreadyProcessed => "duplicate",
                HandlerOutcome::NoHandler => "ignored",
            };
            (
                StatusCode::OK,
                Json(json!({ "status": status, "event_type": event.event_type })),
            )
                .into_response()
        }
        WebhookResponse::MissingSignature
        | WebhookResponse::InvalidSignature
        | WebhookResponse::SecretNotConfigured => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid webhook signature" })),
        )
            .into_response(),
        WebhookResponse::InvalidPayload { message } => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": message })),
        )
            .into_response(),
    }
}
