//! Connection Fabric's HTTP/WebSocket transport binding and the
//! Orchestrator that glues it to the rest of the relay.

pub mod auth;
pub mod http;
pub mod metrics;
pub mod orchestrator;
pub mod state;
pub mod ws;

pub use http::create_router;
pub use metrics::init_metrics;
pub use orchestrator::Orchestrator;
pub use state::AppState;

use axum::http::StatusCode;
use thiserror::Error;

/// Server-scoped error type
#[derive(Error, Debug, Clone)]
pub enum ServerError {
    #[error("session error: {0}")]
    Session(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => StatusCode::NOT_FOUND,
            ServerError::Connection(_) => StatusCode::BAD_REQUEST,
            ServerError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServerError::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
