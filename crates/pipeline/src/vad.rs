//! Voice Activity Detector: a per-stream spectral + RMS classifier
//! with a sliding history window.
//!
//! Stateless across streams by construction: each stream's history lives
//! under its own `StreamKey` entry and is cleared with `clear`. On any
//! numerical failure the detector errs toward "is speech" ("Audio decoding / VAD numeric failure... Treat chunk as speech").

use dashmap::DashMap;
use rustfft::{num_complex::Complex32, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;
use voice_relay_config::VadConfig;
use voice_relay_core::StreamKey;

pub struct VoiceActivityDetector {
    config: VadConfig,
    history: DashMap<StreamKey, VecDeque<u8>>,
    planner: parking_lot::Mutex<FftPlanner<f32>>,
}

impl VoiceActivityDetector {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            history: DashMap::new(),
            planner: parking_lot::Mutex::new(FftPlanner::new()),
        }
    }

    /// Classify one incoming chunk as speech (`true`) or non-speech
    /// (`false`) for `key`, updating its sliding history window.
    pub fn is_speech(&self, key: &StreamKey, chunk: &[u8]) -> bool {
        let mut buffer = self
            .history
            .entry(key.clone())
            .or_insert_with(VecDeque::new);
        buffer.extend(chunk.iter().copied());
        while buffer.len() > self.config.spectral_history_max_bytes {
            buffer.pop_front();
        }

        if buffer.len() < self.config.min_analysis_bytes {
            return true;
        }

        let samples = pcm16_to_f32(buffer.make_contiguous());
        self.classify(&samples)
    }

    fn classify(&self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return true;
        }

        let rms = rms(samples);
        if !rms.is_finite() {
            return true;
        }
        if rms < self.config.rms_silence_threshold {
            return false;
        }

        match self.speech_noise_ratio(samples) {
            Some(ratio) if ratio.is_finite() => ratio > self.config.speech_noise_ratio_threshold,
            _ => true,
        }
    }

    fn speech_noise_ratio(&self, samples: &[f32]) -> Option<f32> {
        let n = samples.len();
        if n == 0 {
            return None;
        }

        let mut buffer: Vec<Complex32> = samples.iter().map(|&s| Complex32::new(s, 0.0)).collect();
        let fft = {
            let mut planner = self.planner.lock();
            planner.plan_fft_forward(n)
        };
        fft.process(&mut buffer);

        let bin_hz = self.config.sample_rate_hz as f32 / n as f32;
        let mut voice_energy = 0.0f32;
        let mut noise_energy = 0.0f32;
        // Only the first half carries distinct frequency information for
        // real-valued input (Nyquist symmetry).
        for (i, c) in buffer.iter().take(n / 2 + 1).enumerate() {
            let freq = i as f32 * bin_hz;
            let magnitude_sq = c.norm_sqr();
            if freq >= self.config.fft_speech_freq_min_hz && freq <= self.config.fft_speech_freq_max_hz
            {
                voice_energy += magnitude_sq;
            } else if freq >= self.config.fft_noise_freq_min_hz {
                noise_energy += magnitude_sq;
            }
        }

        const EPSILON: f32 = 1e-6;
        Some(voice_energy / (noise_energy + EPSILON))
    }

    /// Drop a stream's history, e.g. when its chunker/interim session ends.
    pub fn clear(&self, key: &StreamKey) {
        self.history.remove(key);
    }
}

fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32)
        .collect()
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Shared handle, since the connection fabric and chunker both reach for
/// classification on the same stream from different tasks.
pub type SharedVad = Arc<VoiceActivityDetector>;

#[cfg(test)]
mod tests {
    use super::*;
    use voice_relay_core::{SessionId, UserId};

    fn key() -> StreamKey {
        StreamKey::new(SessionId::from("s1"), UserId::from("u1"))
    }

    fn silence(bytes: usize) -> Vec<u8> {
        vec![0u8; bytes]
    }

    fn tone(bytes: usize, freq_hz: f32, sample_rate: u32, amplitude: f32) -> Vec<u8> {
        let n_samples = bytes / 2;
        let mut out = Vec::with_capacity(bytes);
        for i in 0..n_samples {
            let t = i as f32 / sample_rate as f32;
            let sample = (amplitude * (2.0 * std::f32::consts::PI * freq_hz * t).sin()) as i16;
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }

    #[test]
    fn below_analysis_minimum_assumes_speech() {
        let vad = VoiceActivityDetector::new(VadConfig::default());
        assert!(vad.is_speech(&key(), &silence(10)));
    }

    #[test]
    fn sustained_silence_is_not_speech() {
        let vad = VoiceActivityDetector::new(VadConfig::default());
        let key = key();
        // Fill past the analysis minimum with true silence.
        for _ in 0..4 {
            vad.is_speech(&key, &silence(2_000));
        }
        assert!(!vad.is_speech(&key, &silence(2_000)));
    }

    #[test]
    fn mid_band_tone_above_threshold_is_speech() {
        let vad = VoiceActivityDetector::new(VadConfig::default());
        let key = key();
        let chunk = tone(4_000, 440.0, 16_000, 8_000.0);
        for _ in 0..3 {
            vad.is_speech(&key, &chunk);
        }
        assert!(vad.is_speech(&key, &chunk));
    }

    #[test]
    fn clear_drops_history() {
        let vad = VoiceActivityDetector::new(VadConfig::default());
        let key = key();
        vad.is_speech(&key, &silence(2_000));
        assert!(vad.history.contains_key(&key));
        vad.clear(&key);
        assert!(!vad.history.contains_key(&key));
    }
}
