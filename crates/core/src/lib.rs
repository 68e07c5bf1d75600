//! Core traits and types for the playback engine
//!
//! This crate provides foundational types used across all other crates:
//! - Segments, playback state and voice descriptors
//! - Error taxonomy
//! - Host ports (speech capability, key-value and progress storage)
//! - Reading-time helpers

pub mod error;
pub mod reading;
pub mod traits;
pub mod types;

pub use error::{Error, HostErrorKind, Result};
pub use reading::{estimate_duration, format_time, reading_minutes};
pub use traits::{
    BoundaryKind, HostEvent, KeyValueStore, ProgressStore, SpeechCapability, Utterance,
    UtteranceToken,
};
pub use types::{
    progress_percent, Book, PlaybackState, PlaybackStatus, ProgressRecord, Segment,
    VoiceDescriptor,
};
