//! Core traits and types for the voice turn engine
//!
//! This crate provides foundational types used across all other crates:
//! - Audio clip and buffer types
//! - Error types
//! - Conversation history types
//! - Transcript and sentence types

pub mod audio;
pub mod conversation;
pub mod error;
pub mod sentence;
pub mod transcript;

pub use audio::{AudioBuffer, AudioClip};
pub use conversation::{ConversationHistory, Turn, TurnRole};
pub use error::{Error, Result};
pub use sentence::{SentenceUnit, SynthesisResult};
pub use transcript::TranscriptResult;
