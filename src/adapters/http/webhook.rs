//! Axum endpoint for provider webhooks.
//!
//! # Routes
//! - `POST /webhooks/stripe` - Verified, idempotent Stripe event intake
//! - `GET /health` - Liveness probe
//!
//! Status mapping: 200 for processed, duplicate and ignored deliveries;
//! 400 for signature, timestamp and parse failures; 500 when the failure
//! is retryable so the provider redelivers.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::application::handlers::webhook::{ReceiptStatus, WebhookProcessor};
use crate::domain::webhook::WebhookError;

/// Shared state for webhook routes.
#[derive(Clone)]
pub struct WebhookAppState {
    pub stripe: Arc<WebhookProcessor>,
}

impl WebhookAppState {
    pub fn new(stripe: Arc<WebhookProcessor>) -> Self {
        Self { stripe }
    }
}

#[derive(Debug, Serialize)]
struct WebhookAccepted {
    ok: bool,
    status: ReceiptStatus,
    id: String,
    #[serde(rename = "type")]
    event_type: String,
}

#[derive(Debug, Serialize)]
struct WebhookRejected {
    ok: bool,
    error: String,
}

/// POST /webhooks/stripe
pub async fn handle_stripe_webhook(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let receipt = state.stripe.process(&body, &headers).await?;
    Ok(Json(WebhookAccepted {
        ok: true,
        status: receipt.status,
        id: receipt.event_id,
        event_type: receipt.event_type,
    }))
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// API error type that converts webhook errors to HTTP responses.
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Webhook failed, asking for redelivery");
        }
        let body = WebhookRejected {
            ok: false,
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Webhook routes without middleware.
pub fn webhook_routes() -> Router<WebhookAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Complete router with request ids, tracing and a request timeout.
pub fn webhook_router(state: WebhookAppState, request_timeout: Duration) -> Router {
    Router::new()
        .nest("/webhooks", webhook_routes())
        .route("/health", get(health))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
