//! Streaming token generation interface

use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::Stream;

use voiceturn_core::Turn;

use crate::LlmError;

/// Token stream type
pub type TokenStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// One event on the generation stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text fragment
    Delta(String),
    /// Explicit end marker; the stream yields nothing useful after this
    Done,
    /// Error marker carried in-band by the transport
    Error(String),
}

/// Request for one streamed response
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Conversation history, oldest-first, ending with the user turn
    pub history: Vec<Turn>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl GenerateRequest {
    /// Create a request from a history snapshot with default knobs
    pub fn new(history: Vec<Turn>) -> Self {
        Self {
            history,
            max_tokens: 512,
            temperature: 0.7,
        }
    }
}

/// Streaming text generator backend.
///
/// Cancellation is realized by dropping the returned stream; the backend
/// is expected to abort its transport when that happens.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Open a token stream for the given request
    async fn generate(&self, request: GenerateRequest) -> Result<TokenStream, LlmError>;
}

/// Create a channel pair for feeding a [`TokenStream`] by hand.
///
/// Used by channel-backed transports and test stubs.
pub fn channel_stream(buffer: usize) -> (mpsc::Sender<StreamEvent>, TokenStream) {
    use futures::StreamExt;

    let (tx, rx) = mpsc::channel(buffer);
    let stream = tokio_stream::wrappers::ReceiverStream::new(rx).boxed();
    (tx, stream)
}
