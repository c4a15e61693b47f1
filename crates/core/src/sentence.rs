//! Sentence unit and synthesis result types

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;

/// One segmented, speech-ready chunk of streamed text.
///
/// Indices are contiguous and strictly increasing within a turn, starting
/// at 0; an index is never reused or emitted twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceUnit {
    /// Per-turn monotonic index
    pub index: usize,
    /// Cleaned display/speech text
    pub text: String,
}

impl SentenceUnit {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// Decoded audio for one sentence.
///
/// Produced asynchronously; arrival order is unconstrained relative to
/// index order.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    /// Index of the sentence this audio belongs to
    pub index: usize,
    /// Decoded playable audio
    pub audio: AudioBuffer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_unit() {
        let unit = SentenceUnit::new(0, "Hello world.");
        assert_eq!(unit.index, 0);
        assert_eq!(unit.text, "Hello world.");
    }
}
