//! Session controller
//!
//! Owns the per-turn state machine and the monotonic interaction version,
//! and orchestrates the decoder, dispatcher, scheduler, and VAD across one
//! conversational turn. Exactly one turn is active at a time; every
//! asynchronous callback carries the version it was started under and
//! becomes inert once that version is stale.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use voiceturn_config::Settings;
use voiceturn_core::{AudioClip, ConversationHistory, Turn};
use voiceturn_llm::{GenerateRequest, StreamEvent, TextGenerator};
use voiceturn_pipeline::{
    AudioDecoder, Clock, DecoderConfig, DecoderEvent, MonotonicClock, PlaybackConfig,
    PlaybackEvent, PlaybackScheduler, SentenceStreamDecoder, SpeechSynthesizer, SynthesisConfig,
    SynthesisDispatcher, Transcriber, VadConfig, VadState, VadTransition, VoiceActivityDetector,
};

use crate::SessionError;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum conversation turns kept in memory
    pub max_history_turns: usize,
    /// Synthesize and play responses (false = text-only turns)
    pub synthesis_enabled: bool,
    /// Let the VAD end the listening phase automatically
    pub auto_turn: bool,
    /// Allow the user to interrupt playback by speaking
    pub barge_in_enabled: bool,
    /// Sustained speech required to trigger barge-in (ms)
    pub barge_in_min_speech_ms: u32,
    /// Maximum tokens per generated response
    pub max_tokens: u32,
    /// Sampling temperature for generation
    pub temperature: f32,
    /// VAD configuration
    pub vad: VadConfig,
    /// Decoder configuration
    pub decoder: DecoderConfig,
    /// Synthesis dispatch configuration
    pub synthesis: SynthesisConfig,
    /// Playback scheduling configuration
    pub playback: PlaybackConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_turns: 32,
            synthesis_enabled: true,
            auto_turn: true,
            barge_in_enabled: true,
            barge_in_min_speech_ms: 150,
            max_tokens: 512,
            temperature: 0.7,
            vad: VadConfig::default(),
            decoder: DecoderConfig::default(),
            synthesis: SynthesisConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            max_history_turns: settings.session.max_history_turns,
            synthesis_enabled: settings.session.synthesis_enabled,
            auto_turn: settings.session.auto_turn,
            barge_in_enabled: settings.session.barge_in_enabled,
            barge_in_min_speech_ms: settings.session.barge_in_min_speech_ms,
            max_tokens: settings.session.max_tokens,
            temperature: settings.session.temperature,
            vad: VadConfig {
                sample_rate: settings.vad.sample_rate,
                speech_threshold: settings.vad.speech_threshold,
                silence_threshold: settings.vad.silence_threshold,
                min_silence_ms: settings.vad.min_silence_ms,
                min_capture_ms: settings.vad.min_capture_ms,
            },
            decoder: DecoderConfig {
                min_sentence_len: settings.decoder.min_sentence_len,
                hidden_open: settings.decoder.hidden_open.clone(),
                hidden_close: settings.decoder.hidden_close.clone(),
            },
            synthesis: SynthesisConfig {
                request_timeout_ms: settings.synthesis.request_timeout_ms,
                voice_id: settings.session.voice_id.clone(),
            },
            playback: PlaybackConfig {
                lead_ms: settings.playback.lead_ms,
            },
        }
    }
}

/// Interaction state for one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    /// Waiting for a turn to start
    Idle,
    /// Capturing user speech
    Listening,
    /// Transcribing the captured clip
    Processing,
    /// Consuming the generated text stream
    Streaming,
    /// Playing synthesized audio
    Speaking,
}

/// Session events
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// State machine transition
    StateChanged {
        old: InteractionState,
        new: InteractionState,
    },
    /// A new listening phase began under this version
    ListeningStarted { version: u64 },
    /// Final transcript for the turn
    Transcript { text: String },
    /// Raw visible text fragment, for live display
    Token { text: String },
    /// Sentence unit emitted by the decoder
    Sentence { index: usize, text: String },
    /// Per-frame capture energy, for visualization
    SpeechLevel { rms: f32, voiced: bool },
    /// Turn finished with this response text
    TurnCompleted { text: String },
    /// User-visible error
    Error(String),
}

/// Per-turn handles owned while a turn is in flight
struct ActiveTurn {
    scheduler: Arc<PlaybackScheduler>,
    cancel: CancellationToken,
}

/// Session controller for one conversation.
pub struct SessionController {
    session_id: String,
    config: SessionConfig,
    state: Mutex<InteractionState>,
    /// Bumped on every new listening phase and on every interrupt; async
    /// results carrying an older value are discarded without touching
    /// queues or firing transitions.
    version: AtomicU64,
    /// Reentrancy guard: exactly one turn may be active
    turn_active: AtomicBool,
    history: Mutex<ConversationHistory>,
    vad: Mutex<VoiceActivityDetector>,
    capture: Mutex<AudioClip>,
    /// Barge-in speech accumulator while speaking (ms)
    barge_in_speech_ms: Mutex<u32>,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    audio_decoder: Arc<dyn AudioDecoder>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<SessionEvent>,
    active: Mutex<Option<ActiveTurn>>,
}

impl SessionController {
    /// Create a new session controller
    pub fn new(
        config: SessionConfig,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        audio_decoder: Arc<dyn AudioDecoder>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            session_id: Uuid::new_v4().to_string(),
            state: Mutex::new(InteractionState::Idle),
            version: AtomicU64::new(0),
            turn_active: AtomicBool::new(false),
            history: Mutex::new(ConversationHistory::new(config.max_history_turns)),
            vad: Mutex::new(VoiceActivityDetector::new(config.vad.clone())),
            capture: Mutex::new(AudioClip::new(config.vad.sample_rate)),
            barge_in_speech_ms: Mutex::new(0),
            transcriber,
            generator,
            synthesizer,
            audio_decoder,
            clock: Arc::new(MonotonicClock::new()),
            event_tx,
            active: Mutex::new(None),
            config,
        }
    }

    /// Replace the playback clock (deterministic tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Get session ID
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get current state
    pub fn state(&self) -> InteractionState {
        *self.state.lock()
    }

    /// Current interaction version
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Whether a turn is currently in progress
    pub fn is_busy(&self) -> bool {
        self.turn_active.load(Ordering::SeqCst)
    }

    /// Snapshot of the conversation history
    pub fn history(&self) -> Vec<Turn> {
        self.history.lock().snapshot()
    }

    /// Begin a new listening phase.
    ///
    /// Rejects with [`SessionError::Busy`] while a turn is in progress.
    /// Bumps the interaction version: stale callbacks from any previous
    /// turn become inert from this point on.
    pub fn start_listening(&self) -> Result<u64, SessionError> {
        if self.turn_active.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Busy);
        }

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        self.vad.lock().reset();
        *self.capture.lock() = AudioClip::new(self.config.vad.sample_rate);
        *self.barge_in_speech_ms.lock() = 0;

        self.set_state(InteractionState::Listening);
        let _ = self.event_tx.send(SessionEvent::ListeningStarted { version });
        tracing::debug!(version, "listening started");
        Ok(version)
    }

    /// Feed one frame of captured audio.
    ///
    /// While listening: accumulates the capture and drives the VAD (which
    /// may end the turn automatically). While speaking with barge-in
    /// enabled: sustained speech energy interrupts playback and starts a
    /// new listening phase.
    pub fn feed_audio(self: &Arc<Self>, samples: &[f32]) {
        let state = *self.state.lock();
        match state {
            InteractionState::Listening => {
                self.capture.lock().push_frame(samples);
                let result = self.vad.lock().process_frame(samples);
                let _ = self.event_tx.send(SessionEvent::SpeechLevel {
                    rms: result.rms,
                    voiced: result.state == VadState::Speech,
                });

                if !self.config.auto_turn {
                    return;
                }
                if let Some(VadTransition::SpeechEnd { valid, speech_ms }) = result.transition {
                    if valid {
                        tracing::debug!(speech_ms, "speech ended, finishing capture");
                        if let Err(e) = self.finish_capture() {
                            tracing::error!(error = %e, "failed to finish capture");
                        }
                    } else {
                        tracing::debug!(speech_ms, "capture below minimum duration, discarding");
                        self.capture.lock().clear();
                    }
                }
            }
            InteractionState::Speaking if self.config.barge_in_enabled => {
                let rms = VoiceActivityDetector::rms(samples);
                if rms > self.config.vad.speech_threshold {
                    let frame_ms = (samples.len() as u64 * 1000
                        / self.config.vad.sample_rate.max(1) as u64)
                        as u32;
                    let triggered = {
                        let mut acc = self.barge_in_speech_ms.lock();
                        *acc = acc.saturating_add(frame_ms);
                        *acc >= self.config.barge_in_min_speech_ms
                    };
                    if triggered {
                        tracing::info!("barge-in detected");
                        self.interrupt();
                        if let Err(e) = self.start_listening() {
                            tracing::error!(error = %e, "failed to restart listening");
                        }
                    }
                } else {
                    *self.barge_in_speech_ms.lock() = 0;
                }
            }
            _ => {}
        }
    }

    /// End the listening phase and run the turn.
    ///
    /// A capture below the minimum duration is discarded and the session
    /// returns to idle silently. No-op outside the listening state.
    pub fn finish_capture(self: &Arc<Self>) -> Result<(), SessionError> {
        if *self.state.lock() != InteractionState::Listening {
            return Ok(());
        }

        let clip = {
            let mut capture = self.capture.lock();
            std::mem::replace(&mut *capture, AudioClip::new(self.config.vad.sample_rate))
        };

        if clip.duration() < Duration::from_millis(self.config.vad.min_capture_ms as u64) {
            tracing::debug!("capture below minimum duration, discarding turn");
            self.release_turn();
            return Ok(());
        }

        self.set_state(InteractionState::Processing);

        let version = self.version.load(Ordering::SeqCst);
        let scheduler = Arc::new(PlaybackScheduler::new(
            self.config.playback.clone(),
            Arc::clone(&self.clock),
        ));
        let cancel = CancellationToken::new();
        *self.active.lock() = Some(ActiveTurn {
            scheduler: Arc::clone(&scheduler),
            cancel: cancel.clone(),
        });

        if self.config.synthesis_enabled {
            // Subscribe before the turn task can admit anything, so the
            // driver never misses the first play event.
            let playout_rx = scheduler.subscribe();
            tokio::spawn(Arc::clone(self).run_playout(
                Arc::clone(&scheduler),
                playout_rx,
                version,
            ));
        }

        tokio::spawn(Arc::clone(self).run_turn(clip, version, scheduler, cancel));
        Ok(())
    }

    /// Interrupt the in-progress turn immediately.
    ///
    /// Aborts the generation transport, cancels playback, bumps the
    /// interaction version, and releases the turn lock. Outstanding
    /// synthesis requests finish in the background; their results are
    /// discarded as stale.
    pub fn interrupt(&self) {
        if let Some(turn) = self.active.lock().take() {
            turn.cancel.cancel();
            turn.scheduler.cancel();
        }
        self.version.fetch_add(1, Ordering::SeqCst);
        self.set_state(InteractionState::Idle);
        self.turn_active.store(false, Ordering::SeqCst);
        tracing::info!("turn interrupted");
    }

    /// One conversational turn: transcribe, stream, decode, dispatch, wait.
    async fn run_turn(
        self: Arc<Self>,
        clip: AudioClip,
        version: u64,
        scheduler: Arc<PlaybackScheduler>,
        cancel: CancellationToken,
    ) {
        let transcript = tokio::select! {
            _ = cancel.cancelled() => return,
            result = self.transcriber.transcribe(&clip) => result,
        };
        if self.is_stale(version) {
            return;
        }

        let transcript = match transcript {
            Ok(t) => t,
            Err(e) => {
                self.fail_turn(version, format!("transcription failed: {e}"));
                return;
            }
        };

        if transcript.is_empty() {
            tracing::debug!("empty transcript, returning to idle");
            self.end_turn(version);
            return;
        }

        let _ = self.event_tx.send(SessionEvent::Transcript {
            text: transcript.text.clone(),
        });
        self.history.lock().push_user(transcript.text.clone());
        self.set_state(InteractionState::Streaming);

        let request = GenerateRequest {
            history: self.history.lock().snapshot(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let stream = tokio::select! {
            _ = cancel.cancelled() => return,
            result = self.generator.generate(request) => result,
        };
        if self.is_stale(version) {
            return;
        }

        let mut stream = match stream {
            Ok(s) => s,
            Err(e) => {
                self.fail_turn(version, format!("generation failed: {e}"));
                return;
            }
        };

        let mut decoder = SentenceStreamDecoder::new(self.config.decoder.clone());
        let dispatcher = self.config.synthesis_enabled.then(|| {
            SynthesisDispatcher::new(
                self.config.synthesis.clone(),
                Arc::clone(&self.synthesizer),
                Arc::clone(&self.audio_decoder),
                Arc::clone(&scheduler),
            )
        });

        let mut response = String::new();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return,
                event = stream.next() => event,
            };
            if self.is_stale(version) {
                return;
            }

            match event {
                Some(StreamEvent::Delta(delta)) => {
                    for ev in decoder.append(&delta) {
                        self.handle_decoder_event(ev, dispatcher.as_ref(), &mut response);
                    }
                }
                Some(StreamEvent::Error(message)) => {
                    self.fail_turn(version, format!("generation stream error: {message}"));
                    return;
                }
                Some(StreamEvent::Done) | None => break,
            }
        }

        for ev in decoder.finish() {
            self.handle_decoder_event(ev, dispatcher.as_ref(), &mut response);
        }

        let response = response.trim().to_string();
        if response.is_empty() {
            tracing::debug!("empty response text, returning to idle");
            self.end_turn(version);
            return;
        }

        if let Some(dispatcher) = &dispatcher {
            dispatcher.finish(decoder.emitted()).await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = scheduler.wait_for_completion() => {}
            }
        }
        if self.is_stale(version) {
            return;
        }

        self.history.lock().push_assistant(response.clone());
        let _ = self.event_tx.send(SessionEvent::TurnCompleted { text: response });
        self.end_turn(version);
    }

    /// Drive buffer-end timing for the scheduler.
    ///
    /// The real audio backend would call `buffer_finished` from its own
    /// completion callback; this driver derives the same instant from the
    /// scheduled start and the buffer duration.
    async fn run_playout(
        self: Arc<Self>,
        scheduler: Arc<PlaybackScheduler>,
        mut rx: broadcast::Receiver<PlaybackEvent>,
        version: u64,
    ) {
        loop {
            match rx.recv().await {
                Ok(PlaybackEvent::Play { index, buffer, start }) => {
                    self.try_enter_speaking(version);
                    let end = start + buffer.duration();
                    let wait = end.saturating_sub(self.clock.now());
                    tokio::time::sleep(wait).await;
                    tracing::trace!(index, "buffer playout finished");
                    scheduler.buffer_finished();
                }
                Ok(PlaybackEvent::Completed) | Ok(PlaybackEvent::Cancelled) => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "playout driver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn handle_decoder_event(
        &self,
        event: DecoderEvent,
        dispatcher: Option<&SynthesisDispatcher>,
        response: &mut String,
    ) {
        match event {
            DecoderEvent::Text(text) => {
                response.push_str(&text);
                let _ = self.event_tx.send(SessionEvent::Token { text });
            }
            DecoderEvent::Sentence(unit) => {
                let _ = self.event_tx.send(SessionEvent::Sentence {
                    index: unit.index,
                    text: unit.text.clone(),
                });
                if let Some(dispatcher) = dispatcher {
                    dispatcher.dispatch(unit);
                }
            }
        }
    }

    /// Check a captured version against the current one
    fn is_stale(&self, version: u64) -> bool {
        self.version.load(Ordering::SeqCst) != version
    }

    /// Natural turn end: release handles and return to idle
    fn end_turn(&self, version: u64) {
        if self.is_stale(version) {
            return;
        }
        if let Some(turn) = self.active.lock().take() {
            turn.cancel.cancel();
            // Stops the playout driver when nothing was ever scheduled;
            // no-op after normal completion.
            turn.scheduler.cancel();
        }
        self.set_state(InteractionState::Idle);
        self.turn_active.store(false, Ordering::SeqCst);
    }

    /// Unrecoverable turn failure: surface the error and return to idle
    fn fail_turn(&self, version: u64, message: String) {
        if self.is_stale(version) {
            return;
        }
        tracing::error!(%message, "turn failed");
        if let Some(turn) = self.active.lock().take() {
            turn.cancel.cancel();
            turn.scheduler.cancel();
        }
        let _ = self.event_tx.send(SessionEvent::Error(message));
        self.set_state(InteractionState::Idle);
        self.turn_active.store(false, Ordering::SeqCst);
    }

    /// Discarded capture: return to idle without running a turn
    fn release_turn(&self) {
        self.set_state(InteractionState::Idle);
        self.turn_active.store(false, Ordering::SeqCst);
    }

    fn set_state(&self, new: InteractionState) {
        let old = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, new)
        };
        if old != new {
            let _ = self.event_tx.send(SessionEvent::StateChanged { old, new });
        }
    }

    /// First scheduled playback of the turn flips streaming to speaking
    fn try_enter_speaking(&self, version: u64) {
        if self.is_stale(version) {
            return;
        }
        let changed = {
            let mut state = self.state.lock();
            if *state == InteractionState::Streaming {
                *state = InteractionState::Speaking;
                true
            } else {
                false
            }
        };
        if changed {
            let _ = self.event_tx.send(SessionEvent::StateChanged {
                old: InteractionState::Streaming,
                new: InteractionState::Speaking,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voiceturn_core::{AudioBuffer, TranscriptResult};
    use voiceturn_llm::{LlmError, TokenStream};
    use voiceturn_pipeline::PipelineError;

    struct NullTranscriber;

    #[async_trait::async_trait]
    impl Transcriber for NullTranscriber {
        async fn transcribe(&self, _clip: &AudioClip) -> Result<TranscriptResult, PipelineError> {
            Ok(TranscriptResult::new("", 0.0))
        }
    }

    struct NullGenerator;

    #[async_trait::async_trait]
    impl TextGenerator for NullGenerator {
        async fn generate(&self, _request: GenerateRequest) -> Result<TokenStream, LlmError> {
            let (_tx, stream) = voiceturn_llm::channel_stream(1);
            Ok(stream)
        }
    }

    struct NullSynth;

    #[async_trait::async_trait]
    impl SpeechSynthesizer for NullSynth {
        async fn synthesize(
            &self,
            _text: &str,
            _voice_id: Option<&str>,
        ) -> Result<Vec<u8>, PipelineError> {
            Ok(Vec::new())
        }
    }

    struct NullDecoder;

    impl AudioDecoder for NullDecoder {
        fn decode(&self, _encoded: &[u8]) -> Result<AudioBuffer, PipelineError> {
            Ok(AudioBuffer::from_samples(Vec::new(), 16000))
        }
    }

    fn controller() -> Arc<SessionController> {
        Arc::new(SessionController::new(
            SessionConfig::default(),
            Arc::new(NullTranscriber),
            Arc::new(NullGenerator),
            Arc::new(NullSynth),
            Arc::new(NullDecoder),
        ))
    }

    #[tokio::test]
    async fn test_initial_state() {
        let controller = controller();
        assert_eq!(controller.state(), InteractionState::Idle);
        assert!(!controller.is_busy());
        assert_eq!(controller.version(), 0);
    }

    #[tokio::test]
    async fn test_busy_flag_rejects_second_turn() {
        let controller = controller();

        controller.start_listening().unwrap();
        assert!(controller.is_busy());

        let err = controller.start_listening().unwrap_err();
        assert!(matches!(err, SessionError::Busy));
    }

    #[tokio::test]
    async fn test_listening_bumps_version() {
        let controller = controller();

        let v1 = controller.start_listening().unwrap();
        controller.interrupt();
        let v2 = controller.start_listening().unwrap();

        assert!(v2 > v1);
        assert_eq!(controller.version(), v2);
    }

    #[tokio::test]
    async fn test_interrupt_releases_turn_lock() {
        let controller = controller();

        controller.start_listening().unwrap();
        controller.interrupt();

        assert_eq!(controller.state(), InteractionState::Idle);
        assert!(!controller.is_busy());
        assert!(controller.start_listening().is_ok());
    }

    #[tokio::test]
    async fn test_short_capture_discarded() {
        let controller = controller();

        controller.start_listening().unwrap();
        // 20ms of audio against a 300ms minimum
        controller.feed_audio(&[0.1; 320]);
        controller.finish_capture().unwrap();

        assert_eq!(controller.state(), InteractionState::Idle);
        assert!(!controller.is_busy());
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::new();
        settings.session.voice_id = Some("nova".to_string());
        settings.decoder.min_sentence_len = 6;
        settings.playback.lead_ms = 40;

        let config = SessionConfig::from(&settings);
        assert_eq!(config.synthesis.voice_id.as_deref(), Some("nova"));
        assert_eq!(config.decoder.min_sentence_len, 6);
        assert_eq!(config.playback.lead_ms, 40);
    }
}
