//! Concurrency and ordering engine for turn-based voice conversation
//!
//! This crate provides the core pipeline stages:
//! - Voice Activity Detection (short-time energy with hysteresis)
//! - Sentence-boundary streaming decoder with hidden-span filtering
//! - Concurrent speech synthesis dispatch with per-sentence isolation
//! - Ordered gapless playback scheduling with immediate cancellation

pub mod decoder;
pub mod playback;
pub mod stt;
pub mod synth;
pub mod vad;

// Decoder exports
pub use decoder::{DecoderConfig, DecoderEvent, SentenceStreamDecoder};

// Playback exports
pub use playback::{
    Clock, ManualClock, MonotonicClock, PlaybackConfig, PlaybackEvent, PlaybackScheduler,
};

// STT exports
pub use stt::Transcriber;

// Synthesis exports
pub use synth::{AudioDecoder, SpeechSynthesizer, SynthesisConfig, SynthesisDispatcher};

// VAD exports
pub use vad::{VadConfig, VadResult, VadState, VadTransition, VoiceActivityDetector};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("VAD error: {0}")]
    Vad(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Audio error: {0}")]
    Audio(String),
}

impl From<PipelineError> for voiceturn_core::Error {
    fn from(err: PipelineError) -> Self {
        voiceturn_core::Error::Pipeline(err.to_string())
    }
}
