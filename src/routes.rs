//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod admin;
mod decisions;
mod expiration;
mod voices;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    routing::{get, post, put},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Voice routes
        .route("/api/voices", post(voices::create_voice))
        .route("/api/voices", get(voices::list_voices))
        .route("/api/voices/{id}", get(voices::get_voice))
        .route("/api/voices/{id}/votes", post(voices::cast_vote))
        .route("/api/voices/{id}/permissions", get(voices::get_permissions))
        .route("/api/voices/{id}/progress", get(voices::get_progress))
        // Decision routes
        .route("/api/voices/{id}/decisions", post(decisions::execute_decision))
        .route("/api/voices/{id}/decisions", get(decisions::decision_history))
        // Expiration routes
        .route("/api/expiration/scan", post(expiration::scan_expired))
        .route("/api/voices/{id}/expiration", post(expiration::resolve_expiration))
        .route("/api/voices/{id}/expiration", get(expiration::expiration_history))
        // Admin routes
        .route("/api/admin/engine-config", get(admin::get_engine_config))
        .route("/api/admin/engine-config", put(admin::update_engine_config))
        .route("/api/admin/engine-config/revisions", get(admin::list_config_revisions))
        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    }
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
