//! Axum router setup.

use crate::auth::auth_middleware;
use crate::config::RelayConfig;
use crate::handlers::{backup, devices, objects, pairing, sync};
use crate::state::AppState;
use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use cloudvault_core::backup::MAX_PART_SIZE_BYTES;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState, config: &RelayConfig) -> Router {
    // Bearer-authenticated routes
    let authenticated = Router::new()
        .route("/api/v1/sync/init", post(sync::init))
        .route("/api/v1/sync/push", post(sync::push))
        .route("/api/v1/sync/pull", get(sync::pull))
        .route("/api/v1/backup/init", post(backup::init))
        .route("/api/v1/backup/presign-parts", post(backup::presign_parts))
        .route("/api/v1/backup/complete", post(backup::complete))
        .route("/api/v1/backup/abort", post(backup::abort))
        .route("/api/v1/pairing/start", post(pairing::start))
        .route("/api/v1/pairing/claim", post(pairing::claim))
        .route("/api/v1/pairing/status", get(pairing::status))
        .route("/api/v1/pairing/revoke", post(pairing::revoke))
        .route("/api/v1/devices", get(devices::list_devices))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Routes carrying their own credentials
    let public = Router::new()
        .route("/api/v1/devices/heartbeat", post(devices::heartbeat))
        .route("/health", get(health));

    // Limits are enforced by the extractors so oversized bodies still get
    // a JSON error
    let api = Router::new()
        .merge(authenticated)
        .merge(public)
        .layer(DefaultBodyLimit::max(config.max_payload_size));

    let parts = Router::new()
        .route("/objects/{bucket}/{*key}", put(objects::put_part))
        .layer(DefaultBodyLimit::max(MAX_PART_SIZE_BYTES as usize));

    Router::new()
        .merge(api)
        .merge(parts)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id,
            )
        }))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
