//! Host ports
//!
//! The engine and registry never touch ambient globals: speech synthesis and
//! client-local storage are injected through these traits so the playback
//! logic can be driven by deterministic fakes in tests.

mod speech;
mod storage;

pub use speech::{BoundaryKind, HostEvent, SpeechCapability, Utterance, UtteranceToken};
pub use storage::{KeyValueStore, ProgressStore};
