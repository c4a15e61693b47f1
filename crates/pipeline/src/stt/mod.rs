//! Transcription service seam
//!
//! Transcription runs out of process; the pipeline only owns the trait
//! boundary. Captured clips go in as linear PCM, text comes back.

use voiceturn_core::{AudioClip, TranscriptResult};

use crate::PipelineError;

/// Transcription backend trait
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one captured clip
    async fn transcribe(&self, clip: &AudioClip) -> Result<TranscriptResult, PipelineError>;
}
