//! Sentence-level chunking for playback
//!
//! Splits extracted text into speakable segments. A segment ends at a run of
//! `.`, `!` or `?`; trailing text without a terminator becomes the last
//! segment. Abbreviations are not special-cased.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use voz_libro_core::Segment;

static SENTENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?]+[.!?]+|[^.!?]+$").expect("valid sentence pattern"));

/// Split text into ordered, trimmed, non-empty segments
pub fn segment(text: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();

    for piece in SENTENCE_PATTERN.find_iter(text) {
        let trimmed = piece.as_str().trim();
        if trimmed.is_empty() {
            continue;
        }
        segments.push(Segment {
            index: segments.len(),
            text: trimmed.to_string(),
            span: piece.range(),
        });
    }

    // Text made only of terminators ("?!") still gets spoken
    if segments.is_empty() {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            segments.push(Segment {
                index: 0,
                text: trimmed.to_string(),
                span: 0..text.len(),
            });
        }
    }

    segments
}

/// Caches the segment sequence of the last source text
///
/// Identity is exact string equality; a different text replaces the entry.
#[derive(Debug)]
pub struct SegmentCache {
    source: Option<String>,
    segments: Arc<[Segment]>,
    computations: usize,
}

impl Default for SegmentCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentCache {
    pub fn new() -> Self {
        Self {
            source: None,
            segments: Arc::from(Vec::new()),
            computations: 0,
        }
    }

    /// Segments for `text`, re-chunking only when the text changed
    ///
    /// Text without speakable content yields an empty sequence and leaves the
    /// cached entry untouched.
    pub fn get_or_segment(&mut self, text: &str) -> Arc<[Segment]> {
        if self.source.as_deref() == Some(text) {
            return Arc::clone(&self.segments);
        }

        let segments: Arc<[Segment]> = segment(text).into();
        self.computations += 1;
        if segments.is_empty() {
            return segments;
        }
        tracing::debug!(
            segments = segments.len(),
            bytes = text.len(),
            "Chunked source text"
        );

        self.source = Some(text.to_string());
        self.segments = Arc::clone(&segments);
        segments
    }

    /// Currently cached segments (empty when nothing is loaded)
    pub fn segments(&self) -> Arc<[Segment]> {
        Arc::clone(&self.segments)
    }

    pub fn is_cached(&self, text: &str) -> bool {
        self.source.as_deref() == Some(text)
    }

    /// Number of times text was actually chunked
    pub fn computations(&self) -> usize {
        self.computations
    }

    pub fn clear(&mut self) {
        self.source = None;
        self.segments = Arc::from(Vec::new());
    }
}
