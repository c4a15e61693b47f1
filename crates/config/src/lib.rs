//! Settings loading and validation for the voice turn engine
//!
//! Provides the serde-backed [`Settings`] tree, loaded from an optional
//! TOML file with `VOICETURN_` environment overrides layered on top.

mod settings;

pub use settings::{
    DecoderSettings, PlaybackSettings, SessionSettings, Settings, SynthesisSettings, VadSettings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}
