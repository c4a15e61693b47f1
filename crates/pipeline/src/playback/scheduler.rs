//! Playback scheduler

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use voiceturn_core::AudioBuffer;

use crate::playback::Clock;

/// Playback scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Fixed lead applied when starting a buffer from idle (ms)
    pub lead_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { lead_ms: 25 }
    }
}

/// Scheduler events for the audio backend
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    /// Start playing a buffer at the given clock value
    Play {
        index: usize,
        buffer: AudioBuffer,
        start: Duration,
    },
    /// An index was marked permanently absent
    Skipped { index: usize },
    /// The turn's playback completed
    Completed,
    /// The turn was cancelled
    Cancelled,
}

/// Per-turn playback queue state. Only the entry at `next_index` is ever
/// played; entries are removed once played.
struct QueueState {
    pending: BTreeMap<usize, AudioBuffer>,
    skipped: BTreeSet<usize>,
    next_index: usize,
    scheduled_end: Duration,
    total_expected: Option<usize>,
    playing: bool,
    done: bool,
    cancelled: bool,
}

impl QueueState {
    fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            skipped: BTreeSet::new(),
            next_index: 0,
            scheduled_end: Duration::ZERO,
            total_expected: None,
            playing: false,
            done: false,
            cancelled: false,
        }
    }
}

/// Ordered gapless playback scheduler for one turn.
///
/// Admission order is arbitrary; playback order is strict index order.
/// Every mutation runs to completion under one lock, so scheduling
/// decisions at buffer-end time never interleave with admissions.
pub struct PlaybackScheduler {
    config: PlaybackConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
    event_tx: broadcast::Sender<PlaybackEvent>,
    done_notify: Notify,
}

impl PlaybackScheduler {
    /// Create a scheduler with the given clock
    pub fn new(config: PlaybackConfig, clock: Arc<dyn Clock>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config,
            clock,
            state: Mutex::new(QueueState::new()),
            event_tx,
            done_notify: Notify::new(),
        }
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.event_tx.subscribe()
    }

    /// Admit decoded audio for an index; starts playback immediately when
    /// the index is next in line and nothing is playing.
    pub fn admit(&self, index: usize, buffer: AudioBuffer) {
        let mut state = self.state.lock();
        if state.cancelled {
            tracing::trace!(index, "admit after cancel ignored");
            return;
        }
        if index < state.next_index || state.pending.contains_key(&index) {
            tracing::debug!(index, "duplicate or stale admit ignored");
            return;
        }

        state.pending.insert(index, buffer);
        self.pump(&mut state);
        self.check_done(&mut state);
    }

    /// Mark an index permanently absent (failed or timed-out synthesis) so
    /// the cursor can pass it instead of stalling the turn.
    pub fn skip(&self, index: usize) {
        let mut state = self.state.lock();
        if state.cancelled {
            return;
        }
        if index < state.next_index {
            return;
        }

        state.skipped.insert(index);
        let _ = self.event_tx.send(PlaybackEvent::Skipped { index });
        self.pump(&mut state);
        self.check_done(&mut state);
    }

    /// Record the expected sentence count and re-evaluate completion
    pub fn mark_complete(&self, total: usize) {
        let mut state = self.state.lock();
        if state.cancelled {
            return;
        }
        state.total_expected = Some(total);
        self.pump(&mut state);
        self.check_done(&mut state);
    }

    /// Signal that the currently playing buffer reached its end.
    ///
    /// Chains the next admitted index synchronously, or goes idle until the
    /// next admit.
    pub fn buffer_finished(&self) {
        let mut state = self.state.lock();
        if state.cancelled {
            return;
        }
        state.playing = false;
        self.pump(&mut state);
        self.check_done(&mut state);
    }

    /// Discard all pending entries, reset the cursor and clock values, and
    /// resolve any outstanding completion waiter immediately.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if state.cancelled {
            return;
        }

        state.pending.clear();
        state.skipped.clear();
        state.next_index = 0;
        state.scheduled_end = Duration::ZERO;
        state.total_expected = None;
        state.playing = false;
        state.done = true;
        state.cancelled = true;
        drop(state);

        let _ = self.event_tx.send(PlaybackEvent::Cancelled);
        self.done_notify.notify_waiters();
        tracing::debug!("playback cancelled");
    }

    /// Wait until the turn's playback completes (or is cancelled).
    ///
    /// Resolves immediately if the condition already holds.
    pub async fn wait_for_completion(&self) {
        loop {
            let notified = self.done_notify.notified();
            if self.state.lock().done {
                return;
            }
            notified.await;
        }
    }

    /// Whether completion (or cancellation) has been reached
    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    /// Whether the scheduler was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Next index the cursor is waiting on
    pub fn next_index(&self) -> usize {
        self.state.lock().next_index
    }

    /// Advance the cursor: pass skipped indices, then start the next
    /// pending buffer if nothing is playing.
    fn pump(&self, state: &mut QueueState) {
        loop {
            if state.playing {
                return;
            }
            if state.skipped.remove(&state.next_index) {
                state.next_index += 1;
                continue;
            }
            let Some(buffer) = state.pending.remove(&state.next_index) else {
                return;
            };

            let start = (self.clock.now() + Duration::from_millis(self.config.lead_ms))
                .max(state.scheduled_end);
            state.scheduled_end = start + buffer.duration();
            state.playing = true;

            let index = state.next_index;
            state.next_index += 1;

            tracing::debug!(index, start_ms = start.as_millis() as u64, "buffer scheduled");
            let _ = self.event_tx.send(PlaybackEvent::Play {
                index,
                buffer,
                start,
            });
        }
    }

    /// Completion: total known, cursor past it, nothing playing.
    fn check_done(&self, state: &mut QueueState) {
        if state.done || state.playing {
            return;
        }
        let Some(total) = state.total_expected else {
            return;
        };
        if state.next_index >= total {
            state.done = true;
            let _ = self.event_tx.send(PlaybackEvent::Completed);
            self.done_notify.notify_waiters();
            tracing::debug!(total, "playback complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::ManualClock;
    use std::time::Duration;

    fn buffer(ms: u64) -> AudioBuffer {
        let samples = (ms as usize) * 16;
        AudioBuffer::from_samples(vec![0.0; samples], 16000)
    }

    fn scheduler() -> (Arc<PlaybackScheduler>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let sched = Arc::new(PlaybackScheduler::new(
            PlaybackConfig { lead_ms: 25 },
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        (sched, clock)
    }

    fn drain_plays(
        sched: &PlaybackScheduler,
        rx: &mut broadcast::Receiver<PlaybackEvent>,
    ) -> Vec<(usize, Duration)> {
        let mut plays = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PlaybackEvent::Play { index, start, .. } = event {
                plays.push((index, start));
                sched.buffer_finished();
            }
        }
        plays
    }

    #[test]
    fn test_any_admission_order_plays_in_index_order() {
        // Every permutation of three arrivals
        let permutations: &[[usize; 3]] = &[
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        for order in permutations {
            let (sched, _clock) = scheduler();
            let mut rx = sched.subscribe();

            for &i in order {
                sched.admit(i, buffer(100));
            }
            sched.mark_complete(3);

            let played: Vec<usize> = drain_plays(&sched, &mut rx)
                .into_iter()
                .map(|(i, _)| i)
                .collect();
            assert_eq!(played, vec![0, 1, 2], "arrival order {order:?}");
            assert!(sched.is_done());
        }
    }

    #[test]
    fn test_gapless_schedule_touches_end_to_start() {
        let (sched, _clock) = scheduler();
        let mut rx = sched.subscribe();

        for i in 0..3 {
            sched.admit(i, buffer(200));
        }
        sched.mark_complete(3);

        let plays = drain_plays(&sched, &mut rx);
        assert_eq!(plays.len(), 3);

        // First buffer starts after the fixed lead only.
        assert_eq!(plays[0].1, Duration::from_millis(25));
        // Each subsequent start equals the previous scheduled end: no gap,
        // no overlap.
        for window in plays.windows(2) {
            let (_, prev_start) = window[0];
            let (_, next_start) = window[1];
            assert_eq!(next_start, prev_start + Duration::from_millis(200));
        }
    }

    #[test]
    fn test_late_start_uses_current_clock() {
        let (sched, clock) = scheduler();
        let mut rx = sched.subscribe();

        sched.admit(0, buffer(100));
        // Simulate the buffer taking far longer than scheduled to drain.
        clock.set(Duration::from_millis(500));
        sched.buffer_finished();

        sched.admit(1, buffer(100));
        sched.mark_complete(2);

        let mut starts = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PlaybackEvent::Play { start, .. } = event {
                starts.push(start);
            }
        }
        // Idle restart: now + lead, not the stale scheduled end.
        assert_eq!(starts[1], Duration::from_millis(525));
    }

    #[test]
    fn test_out_of_order_admit_waits_for_cursor() {
        let (sched, _clock) = scheduler();
        let mut rx = sched.subscribe();

        sched.admit(1, buffer(100));
        assert!(rx.try_recv().is_err(), "index 1 must not play before 0");

        sched.admit(0, buffer(100));
        let plays: Vec<usize> = drain_plays(&sched, &mut rx).into_iter().map(|(i, _)| i).collect();
        assert_eq!(plays, vec![0, 1]);
    }

    #[test]
    fn test_skip_does_not_stall_completion() {
        let (sched, _clock) = scheduler();
        let mut rx = sched.subscribe();

        sched.admit(0, buffer(50));
        sched.skip(1);
        sched.admit(2, buffer(50));
        sched.mark_complete(3);

        let plays: Vec<usize> = drain_plays(&sched, &mut rx).into_iter().map(|(i, _)| i).collect();
        assert_eq!(plays, vec![0, 2]);
        assert!(sched.is_done());
    }

    #[test]
    fn test_all_skipped_completes() {
        let (sched, _clock) = scheduler();

        sched.skip(0);
        sched.skip(1);
        sched.mark_complete(2);

        assert!(sched.is_done());
    }

    #[tokio::test]
    async fn test_wait_resolves_on_completion() {
        let (sched, _clock) = scheduler();

        sched.admit(0, buffer(10));
        let waiter = {
            let sched = Arc::clone(&sched);
            tokio::spawn(async move { sched.wait_for_completion().await })
        };

        sched.mark_complete(1);
        sched.buffer_finished();

        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("completion wait must resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_resolves_pending_wait_immediately() {
        let (sched, _clock) = scheduler();

        // Queue has content and no total; completion is far away.
        sched.admit(0, buffer(500));
        sched.admit(3, buffer(500));

        let waiter = {
            let sched = Arc::clone(&sched);
            tokio::spawn(async move { sched.wait_for_completion().await })
        };
        // Let the waiter register before cancelling.
        tokio::task::yield_now().await;

        sched.cancel();

        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("cancel must resolve the wait")
            .unwrap();
        assert_eq!(sched.next_index(), 0);
    }

    #[tokio::test]
    async fn test_wait_after_completion_resolves_immediately() {
        let (sched, _clock) = scheduler();
        sched.mark_complete(0);

        tokio::time::timeout(Duration::from_millis(100), sched.wait_for_completion())
            .await
            .expect("already-complete wait must resolve");
    }

    #[test]
    fn test_admit_after_cancel_is_inert() {
        let (sched, _clock) = scheduler();
        let mut rx = sched.subscribe();

        sched.cancel();
        let _ = rx.try_recv(); // Cancelled event

        sched.admit(0, buffer(100));
        sched.skip(1);
        sched.mark_complete(2);

        assert!(rx.try_recv().is_err(), "cancelled scheduler must stay silent");
        assert_eq!(sched.next_index(), 0);
    }

    #[test]
    fn test_duplicate_admit_ignored() {
        let (sched, _clock) = scheduler();
        let mut rx = sched.subscribe();

        sched.admit(0, buffer(100));
        sched.admit(0, buffer(100));
        sched.buffer_finished();
        sched.mark_complete(1);

        let plays: Vec<usize> = drain_plays(&sched, &mut rx).into_iter().map(|(i, _)| i).collect();
        assert_eq!(plays, vec![0]);
        assert!(sched.is_done());
    }
}
