//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Session / turn orchestration configuration
    #[serde(default)]
    pub session: SessionSettings,

    /// Sentence stream decoder configuration
    #[serde(default)]
    pub decoder: DecoderSettings,

    /// Speech synthesis dispatch configuration
    #[serde(default)]
    pub synthesis: SynthesisSettings,

    /// Playback scheduling configuration
    #[serde(default)]
    pub playback: PlaybackSettings,

    /// Voice activity detection configuration
    #[serde(default)]
    pub vad: VadSettings,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from an optional file with `VOICETURN_` env overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(Environment::with_prefix("VOICETURN").separator("__"))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_history_turns < 2 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_history_turns".to_string(),
                message: "history must hold at least one exchange (2 turns)".to_string(),
            });
        }

        if self.decoder.min_sentence_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "decoder.min_sentence_len".to_string(),
                message: "minimum sentence length must be at least 1".to_string(),
            });
        }

        if self.decoder.hidden_open.is_empty() || self.decoder.hidden_close.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "decoder.hidden_open".to_string(),
                message: "hidden span markers must be non-empty".to_string(),
            });
        }

        if self.synthesis.request_timeout_ms < 1000 {
            return Err(ConfigError::InvalidValue {
                field: "synthesis.request_timeout_ms".to_string(),
                message: "synthesis timeout below 1000ms will drop most requests".to_string(),
            });
        }

        if self.playback.lead_ms > 500 {
            return Err(ConfigError::InvalidValue {
                field: "playback.lead_ms".to_string(),
                message: "lead above 500ms adds audible latency to every buffer".to_string(),
            });
        }

        if self.vad.silence_threshold > self.vad.speech_threshold {
            return Err(ConfigError::InvalidValue {
                field: "vad.silence_threshold".to_string(),
                message: "silence threshold must not exceed speech threshold".to_string(),
            });
        }

        if self.vad.sample_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "vad.sample_rate".to_string(),
                message: "sample rate must be non-zero".to_string(),
            });
        }

        if self.vad.min_silence_ms < 100 {
            tracing::warn!(
                min_silence_ms = self.vad.min_silence_ms,
                "very short silence debounce may end turns mid-sentence"
            );
        }

        Ok(())
    }
}

/// Session / turn orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Maximum conversation turns kept in memory
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Synthesize and play responses (false = text-only turns)
    #[serde(default = "default_true")]
    pub synthesis_enabled: bool,

    /// Let the VAD end the listening phase automatically
    #[serde(default = "default_true")]
    pub auto_turn: bool,

    /// Allow the user to interrupt playback by speaking
    #[serde(default = "default_true")]
    pub barge_in_enabled: bool,

    /// Sustained speech required to trigger barge-in (ms)
    #[serde(default = "default_barge_in_min_speech_ms")]
    pub barge_in_min_speech_ms: u32,

    /// Synthesis voice identifier
    #[serde(default)]
    pub voice_id: Option<String>,

    /// Maximum tokens per generated response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_history_turns() -> usize {
    32
}
fn default_barge_in_min_speech_ms() -> u32 {
    150
}
fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_history_turns: default_max_history_turns(),
            synthesis_enabled: true,
            auto_turn: true,
            barge_in_enabled: true,
            barge_in_min_speech_ms: default_barge_in_min_speech_ms(),
            voice_id: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Sentence stream decoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderSettings {
    /// Minimum graphemes for a sentence boundary to be accepted
    #[serde(default = "default_min_sentence_len")]
    pub min_sentence_len: usize,

    /// Hidden span opening marker
    #[serde(default = "default_hidden_open")]
    pub hidden_open: String,

    /// Hidden span closing marker
    #[serde(default = "default_hidden_close")]
    pub hidden_close: String,
}

fn default_min_sentence_len() -> usize {
    4
}
fn default_hidden_open() -> String {
    "<think>".to_string()
}
fn default_hidden_close() -> String {
    "</think>".to_string()
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            min_sentence_len: default_min_sentence_len(),
            hidden_open: default_hidden_open(),
            hidden_close: default_hidden_close(),
        }
    }
}

/// Speech synthesis dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSettings {
    /// Per-request timeout before the sentence index is skipped (ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Playback scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Fixed lead applied when starting a buffer from idle (ms)
    #[serde(default = "default_lead_ms")]
    pub lead_ms: u64,
}

fn default_lead_ms() -> u64 {
    25
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            lead_ms: default_lead_ms(),
        }
    }
}

/// Voice activity detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSettings {
    /// Sample rate of captured audio in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// RMS energy above which speech starts
    #[serde(default = "default_speech_threshold")]
    pub speech_threshold: f32,

    /// RMS energy below which silence accumulates
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,

    /// Continuous silence required to end speech (ms)
    #[serde(default = "default_min_silence_ms")]
    pub min_silence_ms: u32,

    /// Captures shorter than this are discarded (ms)
    #[serde(default = "default_min_capture_ms")]
    pub min_capture_ms: u32,
}

fn default_sample_rate() -> u32 {
    16000
}
fn default_speech_threshold() -> f32 {
    0.015
}
fn default_silence_threshold() -> f32 {
    0.008
}
fn default_min_silence_ms() -> u32 {
    600
}
fn default_min_capture_ms() -> u32 {
    300
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            speech_threshold: default_speech_threshold(),
            silence_threshold: default_silence_threshold(),
            min_silence_ms: default_min_silence_ms(),
            min_capture_ms: default_min_capture_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::new();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_inverted_vad_thresholds_rejected() {
        let mut settings = Settings::new();
        settings.vad.speech_threshold = 0.005;
        settings.vad.silence_threshold = 0.02;

        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. }
            if field == "vad.silence_threshold"));
    }

    #[test]
    fn test_tiny_synthesis_timeout_rejected() {
        let mut settings = Settings::new();
        settings.synthesis.request_timeout_ms = 100;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_empty_hidden_marker_rejected() {
        let mut settings = Settings::new();
        settings.decoder.hidden_open = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.decoder.min_sentence_len, 4);
        assert!(settings.session.synthesis_enabled);
    }
}
