//! Playback pipeline
//!
//! Turns extracted book text into an ordered sequence of spoken segments:
//! - Sentence chunking with a per-text cache
//! - Voice discovery, ranking and persisted selection
//! - The sequential playback engine over a single-utterance host
//! - Host adapters (scripted fake and timer-driven simulation)

pub mod chunker;
pub mod engine;
pub mod host;
pub mod voices;

pub use chunker::{segment, SegmentCache};
pub use engine::{EngineConfig, PlaybackEngine, PlaybackEvent};
pub use host::{HostCall, ScriptedSpeech, SimulatedSpeech};
pub use voices::VoiceRegistry;
