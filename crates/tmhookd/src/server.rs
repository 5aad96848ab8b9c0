//! HTTP surfaces of the daemon
//!
//! - Webhook server (external-dns webhook protocol v1): `GET /`,
//!   `GET /records`, `POST /records`, `POST /adjustendpoints`
//! - Health server: `GET /healthz`, `GET /readyz`, `GET /stats`
//!
//! Handlers only decode, call the engine and encode. Every engine call is
//! bounded by the request timeout; on expiry the engine future is dropped
//! where it stands.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tmhook_core::endpoint::MEDIA_TYPE;
use tmhook_core::{Changes, Endpoint, NegotiationResponse, TrafficManagerEngine};
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    engine: Arc<TrafficManagerEngine>,
    request_timeout: Duration,
    ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(engine: Arc<TrafficManagerEngine>, request_timeout: Duration) -> Self {
        Self {
            engine,
            request_timeout,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flip readiness once the webhook listener accepts connections
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Run an engine call under the request timeout
    async fn bounded<T, F>(&self, what: &str, call: F) -> Result<T, Response>
    where
        F: Future<Output = tmhook_core::Result<T>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_client_error() => {
                tracing::warn!(what, "Rejected request: {}", e);
                Err(error_response(StatusCode::BAD_REQUEST, e.to_string()))
            }
            Ok(Err(e)) => {
                tracing::error!(what, "Request failed: {}", e);
                Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
            }
            Err(_) => {
                tracing::error!(what, timeout = ?self.request_timeout, "Request timed out");
                Err(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("{} timed out after {:?}", what, self.request_timeout),
                ))
            }
        }
    }
}

/// Router for the external-dns webhook protocol
pub fn webhook_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(negotiate))
        .route("/records", get(get_records).post(apply_records))
        .route("/adjustendpoints", axum::routing::post(adjust_endpoints))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Router for liveness, readiness and mirror statistics
pub fn health_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/stats", get(stats))
        .with_state(state)
}

/// JSON body with the webhook media type
fn webhook_json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(header::CONTENT_TYPE, MEDIA_TYPE)], bytes).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, message.into()).into_response()
}

fn decode<T: serde::de::DeserializeOwned>(body: &Bytes, what: &str) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(what, "Failed to decode request body: {}", e);
        error_response(StatusCode::BAD_REQUEST, format!("invalid {} body: {}", what, e))
    })
}

async fn negotiate(State(state): State<AppState>) -> Response {
    tracing::debug!("Negotiation request");
    let filter = state.engine.domain_filter().clone();
    webhook_json(StatusCode::OK, &NegotiationResponse::new(filter))
}

async fn get_records(State(state): State<AppState>) -> Response {
    match state.bounded("get records", state.engine.records()).await {
        Ok(records) => webhook_json(StatusCode::OK, &records),
        Err(response) => response,
    }
}

async fn apply_records(State(state): State<AppState>, body: Bytes) -> Response {
    let changes: Changes = match decode(&body, "changes") {
        Ok(changes) => changes,
        Err(response) => return response,
    };

    if changes.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }

    match state
        .bounded("apply changes", state.engine.apply_changes(&changes))
        .await
    {
        Ok(report) => {
            for failure in &report.failures {
                tracing::warn!(
                    dns_name = %failure.dns_name,
                    kind = ?failure.kind,
                    "Endpoint not applied: {}", failure.reason
                );
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(response) => response,
    }
}

async fn adjust_endpoints(State(state): State<AppState>, body: Bytes) -> Response {
    let endpoints: Vec<Endpoint> = match decode::<Option<Vec<Endpoint>>>(&body, "endpoints") {
        Ok(endpoints) => endpoints.unwrap_or_default(),
        Err(response) => return response,
    };
    webhook_json(StatusCode::OK, &state.engine.adjust_endpoints(endpoints))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn readyz(State(state): State<AppState>) -> Response {
    if state.is_ready() {
        Json(serde_json::json!({ "status": "ready" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "starting" })),
        )
            .into_response()
    }
}

async fn stats(State(state): State<AppState>) -> Response {
    Json(state.engine.mirror().stats().await).into_response()
}
