//! Synthesis dispatcher
//!
//! Fans sentence units out to concurrent synthesis requests and feeds the
//! playback scheduler with decoded audio as results arrive, in whatever
//! order they arrive.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use voiceturn_core::{SentenceUnit, SynthesisResult};

use crate::playback::PlaybackScheduler;
use crate::synth::{AudioDecoder, SpeechSynthesizer, SynthesisConfig};
use crate::PipelineError;

/// Dispatches one concurrent synthesis request per sentence unit.
pub struct SynthesisDispatcher {
    config: SynthesisConfig,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    decoder: Arc<dyn AudioDecoder>,
    scheduler: Arc<PlaybackScheduler>,
    tasks: Mutex<JoinSet<()>>,
}

impl SynthesisDispatcher {
    /// Create a dispatcher feeding the given scheduler
    pub fn new(
        config: SynthesisConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        decoder: Arc<dyn AudioDecoder>,
        scheduler: Arc<PlaybackScheduler>,
    ) -> Self {
        Self {
            config,
            synthesizer,
            decoder,
            scheduler,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Issue the synthesis request for one sentence unit, immediately.
    ///
    /// Requests run concurrently with no throttling. Failures and timeouts
    /// skip the index on the scheduler and leave sibling requests alone.
    pub fn dispatch(&self, unit: SentenceUnit) {
        let synthesizer = Arc::clone(&self.synthesizer);
        let decoder = Arc::clone(&self.decoder);
        let scheduler = Arc::clone(&self.scheduler);
        let voice_id = self.config.voice_id.clone();
        let timeout = Duration::from_millis(self.config.request_timeout_ms);

        self.tasks.lock().spawn(async move {
            let index = unit.index;
            match synthesize_unit(synthesizer, decoder, unit, voice_id, timeout).await {
                Ok(result) => scheduler.admit(result.index, result.audio),
                Err(e) => {
                    tracing::warn!(index, error = %e, "sentence synthesis lost, skipping index");
                    scheduler.skip(index);
                }
            }
        });
    }

    /// Number of requests still in flight
    pub fn in_flight(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Wait for every in-flight request to settle, then tell the scheduler
    /// the turn's expected sentence count.
    pub async fn finish(&self, total: usize) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "synthesis task panicked");
            }
        }
        self.scheduler.mark_complete(total);
    }
}

/// Run one sentence through synthesis and decode, bounded by the request
/// timeout.
async fn synthesize_unit(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    decoder: Arc<dyn AudioDecoder>,
    unit: SentenceUnit,
    voice_id: Option<String>,
    timeout: Duration,
) -> Result<SynthesisResult, PipelineError> {
    let request = synthesizer.synthesize(&unit.text, voice_id.as_deref());
    let encoded = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| PipelineError::Timeout(timeout.as_millis() as u64))??;

    let audio = decoder.decode(&encoded)?;
    Ok(SynthesisResult {
        index: unit.index,
        audio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{ManualClock, PlaybackConfig, PlaybackEvent};
    use crate::PipelineError;
    use voiceturn_core::AudioBuffer;

    /// Synthesizer that returns one byte per input char after a per-index delay
    struct StaggeredSynth {
        delays_ms: Vec<u64>,
    }

    #[async_trait::async_trait]
    impl SpeechSynthesizer for StaggeredSynth {
        async fn synthesize(
            &self,
            text: &str,
            _voice_id: Option<&str>,
        ) -> Result<Vec<u8>, PipelineError> {
            let index: usize = text.parse().unwrap_or(0);
            let delay = self.delays_ms.get(index).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(vec![0u8; 64])
        }
    }

    /// Synthesizer that fails for odd indices
    struct FlakySynth;

    #[async_trait::async_trait]
    impl SpeechSynthesizer for FlakySynth {
        async fn synthesize(
            &self,
            text: &str,
            _voice_id: Option<&str>,
        ) -> Result<Vec<u8>, PipelineError> {
            let index: usize = text.parse().unwrap_or(0);
            if index % 2 == 1 {
                Err(PipelineError::Synthesis("voice service unavailable".into()))
            } else {
                Ok(vec![0u8; 64])
            }
        }
    }

    struct PcmDecoder;

    impl AudioDecoder for PcmDecoder {
        fn decode(&self, encoded: &[u8]) -> Result<AudioBuffer, PipelineError> {
            let samples = vec![0.0f32; encoded.len()];
            Ok(AudioBuffer::from_samples(samples, 16000))
        }
    }

    fn scheduler() -> Arc<PlaybackScheduler> {
        Arc::new(PlaybackScheduler::new(
            PlaybackConfig::default(),
            Arc::new(ManualClock::new()),
        ))
    }

    fn dispatcher(
        synth: Arc<dyn SpeechSynthesizer>,
        scheduler: Arc<PlaybackScheduler>,
    ) -> SynthesisDispatcher {
        SynthesisDispatcher::new(
            SynthesisConfig {
                request_timeout_ms: 2_000,
                voice_id: None,
            },
            synth,
            Arc::new(PcmDecoder),
            scheduler,
        )
    }

    #[tokio::test]
    async fn test_out_of_order_completion_plays_in_order() {
        let scheduler = scheduler();
        let mut rx = scheduler.subscribe();

        // Index 0 is the slowest; 1 and 2 complete first.
        let synth = Arc::new(StaggeredSynth {
            delays_ms: vec![60, 5, 20],
        });
        let dispatcher = dispatcher(synth, Arc::clone(&scheduler));

        for i in 0..3 {
            dispatcher.dispatch(SentenceUnit::new(i, i.to_string()));
        }
        dispatcher.finish(3).await;

        // First event must be index 0 despite its late arrival.
        let mut played = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PlaybackEvent::Play { index, .. } = event {
                played.push(index);
                scheduler.buffer_finished();
            }
        }
        assert_eq!(played, vec![0, 1, 2]);
        assert!(scheduler.is_done());
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_skipped() {
        let scheduler = scheduler();
        let mut rx = scheduler.subscribe();

        let dispatcher = dispatcher(Arc::new(FlakySynth), Arc::clone(&scheduler));
        for i in 0..4 {
            dispatcher.dispatch(SentenceUnit::new(i, i.to_string()));
        }
        dispatcher.finish(4).await;

        let mut played = Vec::new();
        let mut skipped = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                PlaybackEvent::Play { index, .. } => {
                    played.push(index);
                    scheduler.buffer_finished();
                }
                PlaybackEvent::Skipped { index } => skipped.push(index),
                _ => {}
            }
        }

        assert_eq!(played, vec![0, 2]);
        skipped.sort_unstable();
        assert_eq!(skipped, vec![1, 3]);
        // The failed indices must not stall completion.
        assert!(scheduler.is_done());
    }

    #[tokio::test]
    async fn test_finish_settles_before_mark_complete() {
        let scheduler = scheduler();
        let synth = Arc::new(StaggeredSynth {
            delays_ms: vec![30],
        });
        let dispatcher = dispatcher(synth, Arc::clone(&scheduler));

        dispatcher.dispatch(SentenceUnit::new(0, "0".to_string()));
        assert_eq!(dispatcher.in_flight(), 1);

        dispatcher.finish(1).await;
        assert_eq!(dispatcher.in_flight(), 0);

        // The buffer was admitted before mark_complete ran.
        let mut rx = scheduler.subscribe();
        scheduler.buffer_finished();
        assert!(scheduler.is_done());
        drop(rx);
    }
}
