//! Ordered gapless playback scheduling
//!
//! Decoded audio is admitted keyed by sentence index in arbitrary arrival
//! order and played strictly in index order, each buffer scheduled to touch
//! the previous one end-to-start. Scheduling decisions happen synchronously
//! under one lock; the clock is injectable so the timing math is testable
//! without audio hardware.

mod clock;
mod scheduler;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use scheduler::{PlaybackConfig, PlaybackEvent, PlaybackScheduler};
