//! Per-turn session state machine and orchestration
//!
//! Owns the `Idle → Listening → Processing → Streaming → (Speaking) → Idle`
//! state machine, the monotonic interaction version used to discard stale
//! asynchronous results after an interruption, and the wiring between the
//! decoder, dispatcher, scheduler, and VAD for one conversational turn.

mod controller;

pub use controller::{
    InteractionState, SessionConfig, SessionController, SessionEvent,
};

use thiserror::Error;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A turn is already in progress")]
    Busy,

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl From<voiceturn_pipeline::PipelineError> for SessionError {
    fn from(err: voiceturn_pipeline::PipelineError) -> Self {
        SessionError::Pipeline(err.to_string())
    }
}

impl From<voiceturn_llm::LlmError> for SessionError {
    fn from(err: voiceturn_llm::LlmError) -> Self {
        SessionError::Generation(err.to_string())
    }
}

impl From<SessionError> for voiceturn_core::Error {
    fn from(err: SessionError) -> Self {
        voiceturn_core::Error::Session(err.to_string())
    }
}
