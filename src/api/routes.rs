use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::dispatch::{aggregator, DispatchError, Forwarder};
use crate::domain::PayloadError;
use crate::observability::MetricsRegistry;
use crate::registry::RuleRegistryClient;

use super::response::{ForwardResponse, HealthResponse, ReadyResponse};

/// Shared application state.
pub struct AppState {
    /// Dispatch pipeline
    pub forwarder: Arc<Forwarder>,

    /// Registry client, for readiness probes
    pub registry: RuleRegistryClient,

    /// Request and delivery counters
    pub metrics: Arc<MetricsRegistry>,

    /// Largest request body accepted on the forward routes
    pub max_request_bytes: usize,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_request_bytes);

    Router::new()
        .route("/", post(handle_forward))
        .route("/v1/forward", post(handle_forward))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Forward the request body to every enabled rule's analyzer.
async fn handle_forward(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let e = DispatchError::from(PayloadError::Unreadable(rejection.body_text()));
            warn!(error = %e, "Rejecting unreadable request body");
            state.metrics.record_error(&e);
            return (e.status_code(), Json(ForwardResponse::from_error(&e))).into_response();
        }
    };

    match state.forwarder.forward(body).await {
        Ok(result) => (
            aggregator::status_code(&result),
            Json(ForwardResponse::from_result(result)),
        )
            .into_response(),
        Err(e) => (
            e.status_code(),
            Json(ForwardResponse::from_error(&e)),
        )
            .into_response(),
    }
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Readiness check endpoint.
async fn handle_ready(State(state): State<Arc<AppState>>) -> Response {
    let reachable = state.registry.ping().await;
    let categories = state.forwarder.table().iter().map(|(c, _)| c).collect();

    let status = if reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready: reachable,
            registry_reachable: reachable,
            categories,
        }),
    )
        .into_response()
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let metrics = format!(
        "{}\n# HELP forwarder_uptime_seconds Application uptime in seconds\n# TYPE forwarder_uptime_seconds counter\nforwarder_uptime_seconds {}\n",
        state.metrics.to_prometheus(),
        state.start_time.elapsed().as_secs(),
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        metrics,
    )
}
