//! Voice Activity Detector configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub sample_rate_hz: u32,
    /// Bytes of trailing history kept per stream (~400ms at 16kHz/16-bit).
    pub spectral_history_max_bytes: usize,
    /// Below this many buffered bytes, assume speech.
    pub min_analysis_bytes: usize,
    /// Absolute RMS below which a window is classified silent.
    pub rms_silence_threshold: f32,
    pub fft_speech_freq_min_hz: f32,
    pub fft_speech_freq_max_hz: f32,
    pub fft_noise_freq_min_hz: f32,
    /// `R` in `voice_band / (noise_band + eps) > R`.
    pub speech_noise_ratio_threshold: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            spectral_history_max_bytes: 12_800,
            min_analysis_bytes: 1_600,
            rms_silence_threshold: 500.0,
            fft_speech_freq_min_hz: 80.0,
            fft_speech_freq_max_hz: 4_000.0,
            fft_noise_freq_min_hz: 5_000.0,
            speech_noise_ratio_threshold: 2.0,
        }
    }
}

/// Pause Chunker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub silence_threshold_sec: f64,
    pub min_audio_length_sec: f64,
    pub max_accumulated_audio_time_sec: f64,
    pub audio_sample_rate: u32,
    pub audio_bytes_per_sample: u32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            silence_threshold_sec: 0.6,
            min_audio_length_sec: 0.5,
            max_accumulated_audio_time_sec: 5.0,
            audio_sample_rate: 16_000,
            audio_bytes_per_sample: 2,
        }
    }
}

/// Interim Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterimConfig {
    pub publish_interval_ms: u64,
    pub min_chars_to_publish: usize,
    pub max_text_length: usize,
}

impl Default for InterimConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: 200,
            min_chars_to_publish: 3,
            max_text_length: 500,
        }
    }
}

/// Streaming Translation Processor / Batch Segment Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub translation_context_max_chars: usize,
    pub context_snippet_max_chars: usize,
    pub message_dedup_ttl_sec: u64,
    pub stream_context_memory_max_size: usize,
    /// BSW smart-merge window.
    pub merge_window_sec: f64,
    /// BSW `SegmentBuffer` bound.
    pub max_buffer_segments: usize,
    pub default_participant_language: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            translation_context_max_chars: 200,
            context_snippet_max_chars: 100,
            message_dedup_ttl_sec: 30,
            stream_context_memory_max_size: 50,
            merge_window_sec: 1.0,
            max_buffer_segments: 20,
            default_participant_language: "en-US".to_string(),
        }
    }
}

/// Synthesis cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub tts_cache_max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tts_cache_max_size: 100,
        }
    }
}

/// Vendor call deadlines ("Each vendor call has an explicit deadline")
/// and the bounded worker pool vendor calls execute on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    pub stt_timeout_sec: u64,
    pub translate_timeout_sec: u64,
    pub tts_timeout_sec: u64,
    pub worker_pool_size: usize,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            stt_timeout_sec: 20,
            translate_timeout_sec: 5,
            tts_timeout_sec: 10,
            worker_pool_size: 16,
        }
    }
}

/// Orchestrator lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub offline_grace_period_sec: u64,
    pub min_participants: usize,
    pub max_participants: usize,
    pub shutdown_drain_timeout_sec: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            offline_grace_period_sec: 5,
            min_participants: 2,
            max_participants: 4,
            shutdown_drain_timeout_sec: 1,
        }
    }
}
