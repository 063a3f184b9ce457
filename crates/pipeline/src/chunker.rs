//! Pause Chunker: turns one speaker's `AudioFrame` stream into
//! `Segment`s, triggering on natural pauses, an absolute accumulation
//! budget, an explicit silence-timeout poll, or end-of-stream flush.

use crate::vad::SharedVad;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use voice_relay_config::ChunkerConfig;
use voice_relay_core::{AudioFrame, Segment, StreamKey, TriggerReason};

struct State {
    buffer: Vec<u8>,
    last_voice_at: Instant,
    shutdown: bool,
}

impl State {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            last_voice_at: Instant::now(),
            shutdown: false,
        }
    }

    fn buffered_secs(&self, cfg: &ChunkerConfig) -> f64 {
        let frame_bytes = cfg.audio_sample_rate as f64 * cfg.audio_bytes_per_sample as f64;
        if frame_bytes <= 0.0 {
            return 0.0;
        }
        self.buffer.len() as f64 / frame_bytes
    }
}

/// One chunker per active speaker. The emission callback must not block
/// the audio loop longer than bounded; callers typically hand it a
/// channel sender.
pub struct PauseChunker {
    key: StreamKey,
    config: ChunkerConfig,
    vad: SharedVad,
    state: Mutex<State>,
    on_segment: Box<dyn Fn(Segment) + Send + Sync>,
}

impl PauseChunker {
    pub fn new(
        key: StreamKey,
        config: ChunkerConfig,
        vad: SharedVad,
        on_segment: impl Fn(Segment) + Send + Sync + 'static,
    ) -> Self {
        Self {
            key,
            config,
            vad,
            state: Mutex::new(State::new()),
            on_segment: Box::new(on_segment),
        }
    }

    /// Append an incoming frame, consult the VAD, and emit a segment if a
    /// pause or the accumulation budget has been reached.
    pub fn feed(&self, frame: &AudioFrame) {
        let mut state = self.state.lock();
        if state.shutdown {
            return;
        }

        state.buffer.extend_from_slice(&frame.bytes);
        let is_speech = self.vad.is_speech(&self.key, &frame.bytes);
        let now = Instant::now();

        if is_speech {
            state.last_voice_at = now;
        }

        if state.buffered_secs(&self.config) >= self.config.max_accumulated_audio_time_sec {
            self.emit_locked(&mut state, frame, TriggerReason::MaxAccumulation, now);
            return;
        }

        if !is_speech {
            let silence = now.duration_since(state.last_voice_at).as_secs_f64();
            if silence >= self.config.silence_threshold_sec
                && state.buffered_secs(&self.config) >= self.config.min_audio_length_sec
            {
                self.emit_locked(&mut state, frame, TriggerReason::Pause, now);
            }
        }
    }

    /// Called by the caller's poll loop when no frame has arrived for the
    /// configured poll timeout; may emit a segment with `reason=silence`.
    pub fn check_silence_timeout(&self, source_lang: voice_relay_core::Language) {
        let mut state = self.state.lock();
        if state.shutdown || state.buffer.is_empty() {
            return;
        }

        let now = Instant::now();
        let silence = now.duration_since(state.last_voice_at).as_secs_f64();
        if silence >= self.config.silence_threshold_sec
            && state.buffered_secs(&self.config) >= self.config.min_audio_length_sec
        {
            self.emit_raw(&mut state, source_lang, TriggerReason::Silence, now);
        }
    }

    /// Emit the remaining buffer on end-of-stream if it meets the minimum
    /// length; otherwise the tail is silently discarded.
    pub fn flush(&self, source_lang: voice_relay_core::Language) {
        let mut state = self.state.lock();
        if state.shutdown || state.buffer.is_empty() {
            return;
        }
        if state.buffered_secs(&self.config) >= self.config.min_audio_length_sec {
            self.emit_raw(&mut state, source_lang, TriggerReason::EndStream, Instant::now());
        } else {
            state.buffer.clear();
        }
    }

    /// Subsequent operations become no-ops.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
    }

    fn emit_locked(
        &self,
        state: &mut State,
        frame: &AudioFrame,
        reason: TriggerReason,
        now: Instant,
    ) {
        self.emit_with(state, frame.source_lang, reason, now);
    }

    fn emit_raw(
        &self,
        state: &mut State,
        source_lang: voice_relay_core::Language,
        reason: TriggerReason,
        now: Instant,
    ) {
        self.emit_with(state, source_lang, reason, now);
    }

    fn emit_with(
        &self,
        state: &mut State,
        source_lang: voice_relay_core::Language,
        reason: TriggerReason,
        now: Instant,
    ) {
        let duration = Duration::from_secs_f64(state.buffered_secs(&self.config));
        let audio_bytes = std::mem::take(&mut state.buffer);
        state.last_voice_at = now;

        let segment = Segment {
            session_id: self.key.session_id.clone(),
            speaker_id: self.key.speaker_id.clone(),
            source_lang,
            audio_bytes,
            trigger_reason: reason,
            duration,
        };
        metrics::counter!(voice_relay_core::metric_names::SEGMENTS_EMITTED).increment(1);
        (self.on_segment)(segment);
    }
}

pub type SharedChunker = Arc<PauseChunker>;
