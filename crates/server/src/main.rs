//! Voice relay server entry point

use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use voice_relay_config::{load_settings, Settings};
use voice_relay_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("warning: failed to load configuration ({err}), using defaults");
            Settings::default()
        }
    };

    init_tracing();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting voice relay server");

    let metrics_handle = init_metrics();
    tracing::info!("prometheus metrics installed, exposed at /metrics");

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let state = AppState::new(settings, metrics_handle);
    let shutdown = state.shutdown.clone();
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        orchestrator.begin_shutdown();
    });
    let shutdown = state.shutdown.clone();

    let app = create_router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then cancels the shared shutdown token so
/// every chunker, interim session, and vendor worker pool threaded off of
/// it can observe the signal ("on shutdown signal, the fabric stops
/// accepting new connections... drains the session bus; closes all
/// subscribers").
async fn shutdown_signal(shutdown: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        }
    }

    shutdown.cancel();
}

/// JSON-structured logs by default, filterable via `RUST_LOG`; falls back
/// to a sensible default for this service plus `tower_http`'s own request
/// span logging when `RUST_LOG` is unset.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("voice_relay_server=info,tower_http=info"));

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}
