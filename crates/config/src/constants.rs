//! Centralized constants for the playback engine
//!
//! Single source of truth for default values used across crates. Settings
//! fall back to these when a field is absent from every config source.

/// Playback parameter defaults and bounds
pub mod playback {
    /// Normal speaking rate
    pub const DEFAULT_RATE: f32 = 1.0;

    /// Full volume
    pub const DEFAULT_VOLUME: f32 = 1.0;

    /// Host engines accept rates in 0.1..=10
    pub const MIN_RATE: f32 = 0.1;
    pub const MAX_RATE: f32 = 10.0;

    /// Rate ladder used by the speed button
    pub const RATE_STEPS: [f32; 5] = [0.75, 1.0, 1.25, 1.5, 2.0];
}

/// Voice selection defaults
pub mod voices {
    /// Target language family
    pub const DEFAULT_LANGUAGE: &str = "es";

    /// Key under which the selected voice id is stored
    pub const STORAGE_KEY: &str = "voz-libro-voice";

    /// Entries shown in the voice picker
    pub const MAX_LISTED: usize = 6;

    /// Preferred provider/voice name substrings, lower rank wins
    pub const PREFERRED_KEYWORDS: [(&str, u32); 7] = [
        ("Google", 0),
        ("Premium", 1),
        ("Monica", 2),
        ("Mónica", 2),
        ("Paulina", 3),
        ("Jorge", 4),
        ("Diego", 5),
    ];
}

/// Progress persistence
pub mod progress {
    /// Quiescence window before a position is written (ms)
    pub const DEBOUNCE_MS: u64 = 2_000;
}

/// Local storage file defaults
pub mod storage {
    pub const KEY_VALUE_PATH: &str = "data/local-storage.json";
    pub const PROGRESS_PATH: &str = "data/progress.json";
}

/// Simulated host timing (used by the command-line player)
pub mod simulation {
    /// Milliseconds per word at rate 1.0 (150 wpm)
    pub const MS_PER_WORD: u64 = 400;
}
