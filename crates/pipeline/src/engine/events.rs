//! Engine configuration and observable events

use voz_libro_config::PlaybackConfig;
use voz_libro_core::{Error, PlaybackStatus};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_rate: f32,
    pub default_volume: f32,
    pub min_rate: f32,
    pub max_rate: f32,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

impl From<&PlaybackConfig> for EngineConfig {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            default_rate: config.default_rate,
            default_volume: config.default_volume,
            min_rate: config.min_rate,
            max_rate: config.max_rate,
            event_capacity: 256,
        }
    }
}

/// Events broadcast to engine observers
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A segment was handed to the host
    SegmentStarted { index: usize },
    /// Word/sentence boundary inside the current segment
    Boundary { index: usize, char_offset: usize },
    /// Transport status changed
    StateChanged {
        old: PlaybackStatus,
        new: PlaybackStatus,
    },
    /// Unexpected host failure; the engine is back to `Idle`
    Error(Error),
    /// Last segment completed naturally
    Ended,
}
