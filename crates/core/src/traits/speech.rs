//! Speech synthesis capability port
//!
//! Models a single-utterance-at-a-time host engine. The host owns one active
//! utterance slot; callbacks (start, boundary, end, error) are delivered as
//! [`HostEvent`]s on a broadcast channel so that several consumers (engine,
//! voice registry) can listen without overwriting each other's handlers.

use tokio::sync::broadcast;

use crate::error::{HostErrorKind, Result};
use crate::types::VoiceDescriptor;

/// Tag attached to every utterance
///
/// `generation` changes whenever the engine supersedes in-flight audio, so a
/// late callback from a cancelled utterance can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtteranceToken {
    pub generation: u64,
    /// Segment index spoken by this utterance
    pub index: usize,
}

/// One synthesis request for exactly one segment
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub token: UtteranceToken,
    pub text: String,
    pub rate: f32,
    pub volume: f32,
    pub voice_id: Option<String>,
}

/// Granularity of a boundary callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Word,
    Sentence,
    /// Host-specific marks (SSML marks, phonemes...)
    Other,
}

/// Asynchronous host callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Audio for the utterance began
    Started { token: UtteranceToken },
    /// Progress inside the utterance
    Boundary {
        token: UtteranceToken,
        char_index: usize,
        kind: BoundaryKind,
    },
    /// Utterance finished naturally
    Ended { token: UtteranceToken },
    /// Utterance failed or was interrupted
    Error {
        token: UtteranceToken,
        kind: HostErrorKind,
    },
    /// Available voices changed
    VoicesChanged,
}

impl HostEvent {
    /// Token of the utterance this event belongs to
    pub fn token(&self) -> Option<UtteranceToken> {
        match self {
            HostEvent::Started { token }
            | HostEvent::Boundary { token, .. }
            | HostEvent::Ended { token }
            | HostEvent::Error { token, .. } => Some(*token),
            HostEvent::VoicesChanged => None,
        }
    }
}

/// Host text-to-speech capability
///
/// Implementations must not call back into the engine synchronously from
/// these methods; all callbacks go through the channel returned by
/// [`SpeechCapability::subscribe`].
pub trait SpeechCapability: Send + Sync {
    /// Whether synthesis works at all on this runtime
    fn is_available(&self) -> bool;

    /// Current voice snapshot (may change, see [`HostEvent::VoicesChanged`])
    fn voices(&self) -> Vec<VoiceDescriptor>;

    /// Queue an utterance
    fn enqueue(&self, utterance: Utterance) -> Result<()>;

    /// Suspend the in-flight utterance
    fn pause(&self);

    /// Continue the suspended utterance
    fn resume(&self);

    /// Drop the in-flight utterance and anything queued
    ///
    /// A pause survives cancellation; callers leaving a paused state must
    /// call [`SpeechCapability::resume`] themselves.
    fn cancel_all(&self);

    /// Subscribe to host callbacks
    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;
}
