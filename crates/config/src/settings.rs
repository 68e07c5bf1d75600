//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::constants;
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Transport defaults
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Voice selection policy
    #[serde(default)]
    pub voices: VoiceConfig,

    /// Progress persistence
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Local storage locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let playback = &self.playback;

        if !(playback.min_rate > 0.0 && playback.min_rate < playback.max_rate) {
            return Err(ConfigError::InvalidValue {
                field: "playback.min_rate".to_string(),
                message: format!(
                    "rate bounds must satisfy 0 < min < max (got {}..{})",
                    playback.min_rate, playback.max_rate
                ),
            });
        }

        if !(playback.min_rate..=playback.max_rate).contains(&playback.default_rate) {
            return Err(ConfigError::InvalidValue {
                field: "playback.default_rate".to_string(),
                message: "default rate outside configured bounds".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&playback.default_volume) {
            return Err(ConfigError::InvalidValue {
                field: "playback.default_volume".to_string(),
                message: "volume must be within 0.0..=1.0".to_string(),
            });
        }

        if playback.rate_steps.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "playback.rate_steps".to_string(),
                message: "at least one rate step is required".to_string(),
            });
        }

        if let Some(step) = playback
            .rate_steps
            .iter()
            .find(|step| !(playback.min_rate..=playback.max_rate).contains(*step))
        {
            return Err(ConfigError::InvalidValue {
                field: "playback.rate_steps".to_string(),
                message: format!("rate step {} outside configured bounds", step),
            });
        }

        if self.voices.language.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "voices.language".to_string(),
                message: "language family must not be empty".to_string(),
            });
        }

        if self.voices.storage_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "voices.storage_key".to_string(),
                message: "storage key must not be empty".to_string(),
            });
        }

        if self.progress.debounce_ms == 0 {
            tracing::warn!("progress.debounce_ms is 0, every segment change will be written");
        }

        Ok(())
    }
}

/// Transport defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_rate")]
    pub default_rate: f32,

    #[serde(default = "default_volume")]
    pub default_volume: f32,

    #[serde(default = "default_min_rate")]
    pub min_rate: f32,

    #[serde(default = "default_max_rate")]
    pub max_rate: f32,

    /// Rate ladder cycled by the speed control
    #[serde(default = "default_rate_steps")]
    pub rate_steps: Vec<f32>,
}

fn default_rate() -> f32 {
    constants::playback::DEFAULT_RATE
}
fn default_volume() -> f32 {
    constants::playback::DEFAULT_VOLUME
}
fn default_min_rate() -> f32 {
    constants::playback::MIN_RATE
}
fn default_max_rate() -> f32 {
    constants::playback::MAX_RATE
}
fn default_rate_steps() -> Vec<f32> {
    constants::playback::RATE_STEPS.to_vec()
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_rate: default_rate(),
            default_volume: default_volume(),
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
            rate_steps: default_rate_steps(),
        }
    }
}

/// Voice selection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Language family to filter on (primary subtag)
    #[serde(default = "default_language")]
    pub language: String,

    /// Provider/voice name substrings and their rank (lower wins).
    /// Matching is case-insensitive.
    #[serde(default = "default_preferred")]
    pub preferred: BTreeMap<String, u32>,

    /// Key-value storage key for the selected voice id
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Maximum voices exposed to the picker
    #[serde(default = "default_max_listed")]
    pub max_listed: usize,

    /// Voices offered by the simulated host
    #[serde(default = "default_simulated")]
    pub simulated: Vec<SimulatedVoice>,
}

/// Voice definition for the simulated host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulatedVoice {
    pub id: String,
    pub name: String,
    pub language: String,
}

fn default_language() -> String {
    constants::voices::DEFAULT_LANGUAGE.to_string()
}
fn default_preferred() -> BTreeMap<String, u32> {
    constants::voices::PREFERRED_KEYWORDS
        .iter()
        .map(|(keyword, rank)| (keyword.to_string(), *rank))
        .collect()
}
fn default_storage_key() -> String {
    constants::voices::STORAGE_KEY.to_string()
}
fn default_max_listed() -> usize {
    constants::voices::MAX_LISTED
}
fn default_simulated() -> Vec<SimulatedVoice> {
    [
        ("es-es-monica", "Monica", "es-ES"),
        ("es-mx-paulina", "Paulina", "es-MX"),
        ("en-us-samantha", "Samantha", "en-US"),
    ]
    .iter()
    .map(|(id, name, language)| SimulatedVoice {
        id: id.to_string(),
        name: name.to_string(),
        language: language.to_string(),
    })
    .collect()
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            preferred: default_preferred(),
            storage_key: default_storage_key(),
            max_listed: default_max_listed(),
            simulated: default_simulated(),
        }
    }
}

/// Progress persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Quiescence window (ms)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    constants::progress::DEBOUNCE_MS
}

impl ProgressConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Local storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file backing the key-value store
    #[serde(default = "default_kv_path")]
    pub key_value_path: String,

    /// JSON file backing the progress store
    #[serde(default = "default_progress_path")]
    pub progress_path: String,
}

fn default_kv_path() -> String {
    constants::storage::KEY_VALUE_PATH.to_string()
}
fn default_progress_path() -> String {
    constants::storage::PROGRESS_PATH.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_value_path: default_kv_path(),
            progress_path: default_progress_path(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (VOZ_LIBRO__ prefix)
/// 2. config/{env}.toml|yaml (if env specified)
/// 3. config/default.toml|yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Same as [`load_settings`] with an explicit config directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::from(dir.join("default")).required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOZ_LIBRO")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.playback.default_rate, 1.0);
        assert_eq!(settings.progress.debounce(), Duration::from_secs(2));
        assert_eq!(settings.voices.storage_key, "voz-libro-voice");
        assert_eq!(settings.voices.preferred.get("Google"), Some(&0));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.playback.default_volume = 1.5;
        assert!(settings.validate().is_err());

        settings.playback.default_volume = 0.5;
        settings.playback.rate_steps = vec![0.5, 20.0];
        assert!(settings.validate().is_err());

        settings.playback.rate_steps = vec![0.5, 1.0];
        assert!(settings.validate().is_ok());

        settings.voices.language = " ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[playback]\ndefault_rate = 1.25\n\n[progress]\ndebounce_ms = 500\n",
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), None).unwrap();
        assert_eq!(settings.playback.default_rate, 1.25);
        assert_eq!(settings.progress.debounce_ms, 500);
        assert_eq!(settings.playback.default_volume, 1.0);
    }

    #[test]
    fn test_load_missing_dir_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&dir.path().join("absent"), Some("dev")).unwrap();
        assert_eq!(settings.voices.language, "es");
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.toml"), "[playback]\nmin_rate = 3.0\nmax_rate = 2.0\n")
            .unwrap();

        assert!(load_settings_from(dir.path(), None).is_err());
    }
}
