//! Streaming text generation seam
//!
//! This crate provides the interface between the turn engine and whatever
//! streaming text generator backs it:
//! - [`TextGenerator`] trait returning a [`TokenStream`] of delta events
//! - SSE-style delta frame decoding with end and error markers
//! - Channel-backed stream construction for backends and tests

mod frame;
mod generator;

pub use frame::{decode_frame, sse_token_stream};
pub use generator::{channel_stream, GenerateRequest, StreamEvent, TextGenerator, TokenStream};

use thiserror::Error;

/// Text generation errors
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<LlmError> for voiceturn_core::Error {
    fn from(err: LlmError) -> Self {
        voiceturn_core::Error::Generation(err.to_string())
    }
}
