//! Audio types shared across the pipeline

use std::sync::Arc;
use std::time::Duration;

/// Captured microphone audio for a single turn.
///
/// Accumulated frame by frame while listening, then handed off to
/// transcription as one clip. Encoding to a PCM container is the codec
/// layer's job, not this type's.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioClip {
    /// Create an empty clip at the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    /// Append a frame of samples
    pub fn push_frame(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    /// Clip duration based on sample count
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Check if the clip holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop all accumulated samples, keeping the sample rate
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Decoded, playable synthesis output.
///
/// Cheap to clone; samples are shared.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Arc<[f32]>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer from owned samples
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Playback duration of this buffer
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Check if the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
