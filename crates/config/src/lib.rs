//! Configuration management for the playback engine
//!
//! Settings are layered from `config/default.*`, an optional environment
//! specific file and `VOZ_LIBRO__*` environment variables.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, ObservabilityConfig, PlaybackConfig, ProgressConfig,
    Settings, SimulatedVoice, StorageConfig, VoiceConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<ConfigError> for voz_libro_core::Error {
    fn from(err: ConfigError) -> Self {
        voz_libro_core::Error::Config(err.to_string())
    }
}
