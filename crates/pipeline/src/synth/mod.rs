//! Concurrent speech synthesis dispatch
//!
//! Every sentence unit gets its own synthesis request, issued immediately
//! with no throttling or batching; a later index may well finish before an
//! earlier one. Per-sentence failures are isolated: the index is skipped
//! and siblings continue.

mod dispatcher;

pub use dispatcher::SynthesisDispatcher;

use serde::{Deserialize, Serialize};

use voiceturn_core::AudioBuffer;

use crate::PipelineError;

/// Speech synthesis backend trait
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize text to encoded audio bytes
    async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> Result<Vec<u8>, PipelineError>;
}

/// Audio payload decoder trait.
///
/// Decoding the synthesis container into playable samples belongs to the
/// codec layer; the dispatcher only calls through this seam.
pub trait AudioDecoder: Send + Sync {
    /// Decode encoded audio into a playable buffer
    fn decode(&self, encoded: &[u8]) -> Result<AudioBuffer, PipelineError>;
}

/// Synthesis dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Per-request timeout before the sentence index is skipped (ms)
    pub request_timeout_ms: u64,
    /// Voice identifier passed to the synthesizer
    pub voice_id: Option<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            voice_id: None,
        }
    }
}
