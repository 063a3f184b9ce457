//! Bearer-token authentication middleware: constant-time
//! key comparison, public-path bypass, warn-once when auth is disabled.

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use voice_relay_config::Settings;

static AUTH_DISABLED_WARNED: AtomicBool = AtomicBool::new(false);

enum AuthCheck {
    Disabled,
    PublicPath,
    ConfigError(&'static str),
    CheckKey(String),
}

fn check_auth_config(config: &Arc<RwLock<Settings>>, path: &str) -> AuthCheck {
    let config = config.read();
    let auth = &config.server.auth;

    if !auth.enabled {
        if !AUTH_DISABLED_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!("API authentication is disabled; set VOICE_RELAY__SERVER__AUTH__ENABLED=true for production");
        }
        return AuthCheck::Disabled;
    }

    if auth.public_paths.iter().any(|p| path.starts_with(p.as_str())) {
        return AuthCheck::PublicPath;
    }

    match &auth.api_key {
        Some(key) if !key.is_empty() => AuthCheck::CheckKey(key.clone()),
        _ => AuthCheck::ConfigError("auth is enabled but no api_key is configured"),
    }
}

/// Checks `Authorization: Bearer <api_key>` against configuration, skipping
/// public paths and no-op'ing (with a one-time warning) when auth is
/// disabled entirely.
pub async fn auth_middleware(
    axum::extract::State(config): axum::extract::State<Arc<RwLock<Settings>>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match check_auth_config(&config, &path) {
        AuthCheck::Disabled | AuthCheck::PublicPath => next.run(request).await,
        AuthCheck::ConfigError(msg) => {
            tracing::error!("{}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, "server authentication not configured").into_response()
        }
        AuthCheck::CheckKey(expected_key) => {
            let header_value = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            match header_value {
                Some(value) if value.starts_with("Bearer ") => {
                    let provided = &value[7..];
                    if constant_time_compare(provided.as_bytes(), expected_key.as_bytes()) {
                        next.run(request).await
                    } else {
                        tracing::warn!("invalid api key on {}", path);
                        (StatusCode::UNAUTHORIZED, "invalid api key").into_response()
                    }
                }
                Some(_) => (
                    StatusCode::BAD_REQUEST,
                    "invalid Authorization header format, expected: Bearer <token>",
                )
                    .into_response(),
                None => (StatusCode::UNAUTHORIZED, "missing Authorization header").into_response(),
            }
        }
    }
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_compare_matches_equal_secrets() {
        assert!(constant_time_compare(b"secret", b"secret"));
        assert!(!constant_time_compare(b"secret", b"secre"));
        assert!(!constant_time_compare(b"secret", b"secreT"));
    }
}
