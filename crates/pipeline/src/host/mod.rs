//! Speech host adapters
//!
//! Implementations of [`SpeechCapability`](voz_libro_core::SpeechCapability):
//! - `ScriptedSpeech`: deterministic fake, callbacks fired by the caller
//! - `SimulatedSpeech`: timer-driven host that "speaks" at a fixed word rate

mod scripted;
mod simulated;

pub use scripted::{HostCall, ScriptedSpeech};
pub use simulated::SimulatedSpeech;

/// Capacity of host event channels
pub(crate) const HOST_EVENT_CAPACITY: usize = 256;
