//! Prometheus metric names shared across crates. Centralized here, rather
//! than duplicated as string literals in each crate that emits one, so the
//! recorder installed by `voice-relay-server::metrics::init_metrics` and
//! every `metrics::counter!`/`histogram!`/`gauge!` call site agree on
//! spelling.

pub const FRAMES_INGESTED: &str = "voice_relay_frames_ingested_total";
pub const SEGMENTS_EMITTED: &str = "voice_relay_segments_emitted_total";
pub const FINALS_PROCESSED: &str = "voice_relay_finals_processed_total";
pub const TRANSLATIONS_PUBLISHED: &str = "voice_relay_translations_published_total";
pub const CACHE_HITS: &str = "voice_relay_synth_cache_hits_total";
pub const CACHE_MISSES: &str = "voice_relay_synth_cache_misses_total";
pub const DEDUP_HITS: &str = "voice_relay_dedup_hits_total";
pub const VENDOR_CALL_LATENCY: &str = "voice_relay_vendor_call_duration_seconds";
pub const ACTIVE_SESSIONS: &str = "voice_relay_active_sessions";
pub const ACTIVE_CONNECTIONS: &str = "voice_relay_active_connections";
