//! Voice Activity Detection
//!
//! Short-time energy VAD: root-mean-square over fixed frames at a steady
//! cadence, with hysteresis between an upper speech threshold and a lower
//! silence threshold, and a silence debounce before speech ends.

use serde::{Deserialize, Serialize};

/// VAD configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Sample rate of incoming frames in Hz
    pub sample_rate: u32,
    /// RMS energy above which speech starts
    pub speech_threshold: f32,
    /// RMS energy below which silence accumulates
    pub silence_threshold: f32,
    /// Continuous silence required to end speech (ms)
    pub min_silence_ms: u32,
    /// Captures shorter than this are discarded (ms)
    pub min_capture_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            speech_threshold: 0.015,
            silence_threshold: 0.008,
            min_silence_ms: 600,
            min_capture_ms: 300,
        }
    }
}

/// VAD state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// No speech detected
    Silence,
    /// Speech in progress
    Speech,
}

/// Edge transition reported by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    /// Energy crossed the upper threshold
    SpeechStart,
    /// Silence debounce elapsed
    SpeechEnd {
        /// Total capture duration from speech start, trailing silence excluded (ms)
        speech_ms: u32,
        /// Capture met the minimum duration and should be forwarded
        valid: bool,
    },
}

/// Result of processing one frame
#[derive(Debug, Clone, Copy)]
pub struct VadResult {
    /// State after this frame
    pub state: VadState,
    /// RMS energy of this frame
    pub rms: f32,
    /// Edge transition, if this frame caused one
    pub transition: Option<VadTransition>,
}

/// Energy-based voice activity detector
pub struct VoiceActivityDetector {
    config: VadConfig,
    state: VadState,
    /// Silence run inside speech (ms)
    silence_ms: u32,
    /// Time since speech started (ms)
    capture_ms: u32,
}

impl VoiceActivityDetector {
    /// Create a new detector
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: VadState::Silence,
            silence_ms: 0,
            capture_ms: 0,
        }
    }

    /// Process one frame of samples
    pub fn process_frame(&mut self, samples: &[f32]) -> VadResult {
        let rms = Self::rms(samples);
        let frame_ms = self.frame_ms(samples.len());

        let transition = match self.state {
            VadState::Silence => {
                if rms > self.config.speech_threshold {
                    self.state = VadState::Speech;
                    self.silence_ms = 0;
                    self.capture_ms = frame_ms;
                    tracing::debug!(rms, "speech started");
                    Some(VadTransition::SpeechStart)
                } else {
                    None
                }
            }
            VadState::Speech => {
                self.capture_ms = self.capture_ms.saturating_add(frame_ms);

                if rms < self.config.silence_threshold {
                    self.silence_ms = self.silence_ms.saturating_add(frame_ms);
                } else {
                    // Mid-band energy keeps the speech state alive; only a
                    // continuous run below the lower threshold counts.
                    self.silence_ms = 0;
                }

                if self.silence_ms >= self.config.min_silence_ms {
                    let speech_ms = self.capture_ms.saturating_sub(self.silence_ms);
                    let valid = speech_ms >= self.config.min_capture_ms;

                    self.state = VadState::Silence;
                    self.silence_ms = 0;
                    self.capture_ms = 0;
                    tracing::debug!(speech_ms, valid, "speech ended");
                    Some(VadTransition::SpeechEnd { speech_ms, valid })
                } else {
                    None
                }
            }
        };

        VadResult {
            state: self.state,
            rms,
            transition,
        }
    }

    /// Reset detector state
    pub fn reset(&mut self) {
        self.state = VadState::Silence;
        self.silence_ms = 0;
        self.capture_ms = 0;
    }

    /// Get current state
    pub fn state(&self) -> VadState {
        self.state
    }

    /// Get the configuration
    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Root-mean-square energy of a frame
    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = samples.iter().map(|s| s * s).sum();
        (sum / samples.len() as f32).sqrt()
    }

    fn frame_ms(&self, samples: usize) -> u32 {
        if self.config.sample_rate == 0 {
            return 0;
        }
        ((samples as u64 * 1000) / self.config.sample_rate as u64) as u32
    }
}
