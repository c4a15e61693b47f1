//! Sentence-boundary streaming decoder
//!
//! Consumes incremental text deltas, filters hidden spans, segments the
//! surviving text into ordered sentence units for synthesis, and forwards
//! raw visible fragments for live display. Boundary and markup detection
//! are explicit character scans, not regexes.

mod hidden;
mod markup;

pub use hidden::HiddenSpanFilter;
pub use markup::clean_markup;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use voiceturn_core::SentenceUnit;

/// Decoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Minimum graphemes for a sentence boundary to be accepted.
    ///
    /// Guards against abbreviations and decimal points producing spurious
    /// tiny fragments mid-stream.
    pub min_sentence_len: usize,
    /// Hidden span opening marker
    pub hidden_open: String,
    /// Hidden span closing marker
    pub hidden_close: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            min_sentence_len: 4,
            hidden_open: "<think>".to_string(),
            hidden_close: "</think>".to_string(),
        }
    }
}

/// Event emitted by the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    /// Raw visible fragment, for live incremental display
    Text(String),
    /// Completed sentence unit, for synthesis
    Sentence(SentenceUnit),
}

/// Streaming sentence decoder for one turn.
pub struct SentenceStreamDecoder {
    config: DecoderConfig,
    filter: HiddenSpanFilter,
    /// Visible text not yet cut into sentences
    acc: String,
    next_index: usize,
    finished: bool,
}

impl SentenceStreamDecoder {
    /// Create a decoder with the given configuration
    pub fn new(config: DecoderConfig) -> Self {
        let filter = HiddenSpanFilter::new(config.hidden_open.clone(), config.hidden_close.clone());
        Self {
            config,
            filter,
            acc: String::new(),
            next_index: 0,
            finished: false,
        }
    }

    /// Consume one text delta, in arrival order.
    pub fn append(&mut self, delta: &str) -> Vec<DecoderEvent> {
        if self.finished {
            tracing::trace!("delta after stream end ignored");
            return Vec::new();
        }

        let visible = self.filter.push(delta);
        let mut events = Vec::new();

        if !visible.is_empty() {
            events.push(DecoderEvent::Text(visible.clone()));
            self.acc.push_str(&visible);
            self.drain_sentences(&mut events);
        }

        events
    }

    /// Signal stream end: flush any remaining accumulator text as one
    /// final sentence unit, even without terminal punctuation.
    pub fn finish(&mut self) -> Vec<DecoderEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();
        let tail = self.filter.finish();
        if !tail.is_empty() {
            events.push(DecoderEvent::Text(tail.clone()));
            self.acc.push_str(&tail);
        }

        self.drain_sentences(&mut events);

        let rest = std::mem::take(&mut self.acc);
        if let Some(unit) = self.make_unit(&rest) {
            events.push(DecoderEvent::Sentence(unit));
        }

        events
    }

    /// Number of sentence units emitted so far
    pub fn emitted(&self) -> usize {
        self.next_index
    }

    /// Whether the stream has been flushed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Cut every acceptable sentence boundary currently in the accumulator
    fn drain_sentences(&mut self, events: &mut Vec<DecoderEvent>) {
        while let Some(cut) = self.find_boundary() {
            let candidate: String = self.acc.drain(..cut).collect();
            if let Some(unit) = self.make_unit(&candidate) {
                events.push(DecoderEvent::Sentence(unit));
            }
        }
    }

    /// Find the byte offset just past the first acceptable boundary:
    /// terminal punctuation followed by whitespace, with the enclosed
    /// trimmed text meeting the minimum length. Rejected boundaries are
    /// scanned past without cutting.
    fn find_boundary(&self) -> Option<usize> {
        let mut iter = self.acc.char_indices().peekable();
        while let Some((i, c)) = iter.next() {
            if !matches!(c, '.' | '!' | '?') {
                continue;
            }
            let Some(&(_, next)) = iter.peek() else {
                break;
            };
            if !next.is_whitespace() {
                continue;
            }
            let end = i + c.len_utf8();
            let candidate = self.acc[..end].trim();
            if candidate.graphemes(true).count() >= self.config.min_sentence_len {
                return Some(end);
            }
        }
        None
    }

    /// Clean a candidate and wrap it with the next index; empty results
    /// (whitespace or pure markup) produce nothing and consume no index.
    fn make_unit(&mut self, candidate: &str) -> Option<SentenceUnit> {
        let cleaned = clean_markup(candidate.trim());
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return None;
        }

        let unit = SentenceUnit::new(self.next_index, cleaned);
        self.next_index += 1;
        tracing::debug!(index = unit.index, text = %unit.text, "sentence emitted");
        Some(unit)
    }
}
