//! Transcript types for transcription output

use serde::{Deserialize, Serialize};

/// Transcript result from the transcription service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// Transcribed text
    pub text: String,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,

    /// Duration of the transcribed audio in milliseconds
    pub duration_ms: u64,
}

impl TranscriptResult {
    /// Create a new transcript result
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            duration_ms: 0,
        }
    }

    /// Set the audio duration
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Check if the transcript is empty
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Get word count
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

impl Default for TranscriptResult {
    fn default() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            duration_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_result() {
        let result = TranscriptResult::new("Hello world", 0.95).with_duration_ms(1200);

        assert_eq!(result.text, "Hello world");
        assert_eq!(result.duration_ms, 1200);
        assert_eq!(result.word_count(), 2);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_whitespace_is_empty() {
        let result = TranscriptResult::new("   ", 0.5);
        assert!(result.is_empty());
    }
}
