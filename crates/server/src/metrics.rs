//! Prometheus metrics: counters for frames
//! ingested, segments emitted, finals processed, translation events
//! published, cache hits/misses, dedup hits, vendor call latency
//! histograms, and active session/connection gauges.

use axum::extract::State;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use voice_relay_core::metric_names::{
    ACTIVE_CONNECTIONS, ACTIVE_SESSIONS, CACHE_HITS, CACHE_MISSES, DEDUP_HITS, FINALS_PROCESSED,
    FRAMES_INGESTED, SEGMENTS_EMITTED, TRANSLATIONS_PUBLISHED, VENDOR_CALL_LATENCY,
};

use crate::state::AppState;

/// Install the process-wide Prometheus recorder and describe every metric
/// this service emits so `/metrics` has help text even before the first
/// sample.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder");

    metrics::describe_counter!(FRAMES_INGESTED, "PCM16 audio frames ingested from connections");
    metrics::describe_counter!(SEGMENTS_EMITTED, "Segments emitted by the pause chunker");
    metrics::describe_counter!(FINALS_PROCESSED, "Final transcripts processed by the translation fan-out");
    metrics::describe_counter!(TRANSLATIONS_PUBLISHED, "Translation events published on the session bus");
    metrics::describe_counter!(CACHE_HITS, "Synthesis cache hits");
    metrics::describe_counter!(CACHE_MISSES, "Synthesis cache misses");
    metrics::describe_counter!(DEDUP_HITS, "Duplicate transcripts suppressed by the dedup set");
    metrics::describe_histogram!(VENDOR_CALL_LATENCY, "Speech vendor call latency in seconds");
    metrics::describe_gauge!(ACTIVE_SESSIONS, "Currently active call sessions");
    metrics::describe_gauge!(ACTIVE_CONNECTIONS, "Currently registered connection fabric connections");

    handle
}

pub async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
