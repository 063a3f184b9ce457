//! HTTP router: health/readiness/metrics, a thin session
//! admin surface over the Orchestrator's session table, and the
//! `/ws/:session_id` upgrade that is the Connection Fabric's transport
//! binding.

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::ws::ws_handler;
use voice_relay_core::{Language, SessionId};

pub fn create_router(state: AppState) -> Router {
    let (cors_enabled, cors_origins) = {
        let config = state.get_config();
        (config.server.cors_enabled, config.server.cors_origins.clone())
    };
    let cors_layer = build_cors_layer(&cors_origins, cors_enabled);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", delete(end_session))
        .route("/ws/:session_id", get(ws_handler))
        .layer(axum::middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

/// Build the CORS layer from configuration. Disabled CORS falls back to a
/// permissive layer suitable only for local development; an empty origin
/// list falls back to `localhost:3000` rather than silently allowing
/// everything while `cors_enabled = true`.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled; allowing all origins (do not run this way in production)");
        return CorsLayer::permissive();
    }

    let localhost_fallback = || {
        CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any)
    };

    if origins.is_empty() {
        tracing::info!("no cors_origins configured, defaulting to localhost:3000");
        return localhost_fallback();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
                None
            })
        })
            .collect();

    if parsed.is_empty() {
        tracing::error!("all configured CORS origins are invalid, falling back to localhost");
        return localhost_fallback();
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .allow_credentials(true)
}

async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Readiness additionally checks the vendor worker pool is not entirely
/// saturated and reports the active speaker/session counts.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let active_speakers = state.orchestrator.active_speaker_count();
    let mut checks = serde_json::Map::new();
    checks.insert(
        "active_speakers".to_string(),
        serde_json::json!({ "status": "ok", "count": active_speakers }),
    );

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ready",
            "checks": checks,
        })),
    )
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    session_id: String,
    call_language: Language,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    session_id: String,
    call_language: Language,
    active: bool,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, StatusCode> {
    let session_id = SessionId::from(request.session_id);
    let session = state
        .orchestrator
        .repository()
        .create_session(session_id.clone(), request.call_language);
    metrics::gauge!(voice_relay_core::metric_names::ACTIVE_SESSIONS).increment(1.0);
    Ok(Json(SessionResponse {
        session_id: session.session_id.to_string(),
        call_language: session.call_language,
        active: session.active,
    }))
}

async fn end_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    let session_id = SessionId::from(id);
    state.orchestrator.repository().end_session(&session_id);
    metrics::gauge!(voice_relay_core::metric_names::ACTIVE_SESSIONS).decrement(1.0);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
    pub user_id: String,
}

pub fn parse_ws_query(params: &HashMap<String, String>) -> Option<WsQuery> {
    Some(WsQuery {
        token: params.get("token")?.clone(),
        user_id: params.get("user_id")?.clone(),
    })
}
