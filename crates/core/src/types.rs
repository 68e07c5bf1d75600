//! Domain types for segmented playback

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One sentence-level unit of speakable text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Dense 0-based position in the sequence
    pub index: usize,
    /// Trimmed text sent to the host
    pub text: String,
    /// Byte range of the untrimmed piece in the source text
    pub span: Range<usize>,
}

/// Transport status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Speaking,
    Paused,
}

impl PlaybackStatus {
    pub fn is_active(&self) -> bool {
        !matches!(self, PlaybackStatus::Idle)
    }
}

/// Snapshot of the engine's observable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub current_index: usize,
    /// Character offset of the last boundary inside the current segment
    pub char_offset: usize,
    pub rate: f32,
    pub volume: f32,
    pub voice_id: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            current_index: 0,
            char_offset: 0,
            rate: 1.0,
            volume: 1.0,
            voice_id: None,
        }
    }
}

/// Read-only snapshot of a host voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    pub id: String,
    /// Human-readable host name, matched against provider keywords
    pub name: String,
    /// BCP-47 style tag, e.g. `es-ES`
    pub language_tag: String,
    pub is_local: bool,
    pub is_default: bool,
}

impl VoiceDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        language_tag: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            language_tag: language_tag.into(),
            is_local: true,
            is_default: false,
        }
    }

    /// Primary language subtag (`es` for `es-MX` or `es_MX`)
    pub fn language_family(&self) -> &str {
        self.language_tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
    }

    /// Check whether this voice speaks the given language family
    pub fn speaks(&self, family: &str) -> bool {
        self.language_family().eq_ignore_ascii_case(family)
    }

    /// Short label for voice pickers
    ///
    /// Vendor noise is stripped from the host name and the language tag is
    /// appended, e.g. `"Microsoft Helena Online"` → `"Helena (es-ES)"`.
    pub fn display_label(&self) -> String {
        let cleaned = self
            .name
            .replace("Microsoft", "")
            .replace("Online", "")
            .replace("(Natural)", "");
        let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        let cleaned = cleaned.trim_end_matches(" -").trim();
        if cleaned.is_empty() {
            format!("{} ({})", self.name, self.language_tag)
        } else {
            format!("{} ({})", cleaned, self.language_tag)
        }
    }
}

/// Durable progress for one book, owned by the storage collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub book_id: String,
    /// Segment index
    pub last_position: usize,
    /// 0..=100
    pub progress_percent: u8,
}

impl ProgressRecord {
    pub fn new(book_id: impl Into<String>, last_position: usize, total_segments: usize) -> Self {
        Self {
            book_id: book_id.into(),
            last_position,
            progress_percent: progress_percent(last_position, total_segments),
        }
    }
}

/// `round(100 * index / total)`, clamped to 0..=100
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (100.0 * index as f64 / total as f64).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Book record handed over by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub text_content: String,
    #[serde(default)]
    pub last_position: usize,
    #[serde(default)]
    pub progress_percent: u8,
}

impl Book {
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: "Desconocido".to_string(),
            text_content: text.into(),
            last_position: 0,
            progress_percent: 0,
        }
    }
}
