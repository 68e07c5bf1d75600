//! Deterministic speech host
//!
//! Records every primitive the engine calls and only fires callbacks when the
//! test (or a single-threaded driver) asks for them. `cancel_all` reports the
//! dropped utterance as `Canceled`, the way browser engines do, so the
//! engine's stale-callback handling is exercised.

use parking_lot::Mutex;
use tokio::sync::broadcast;

use voz_libro_core::{
    BoundaryKind, Error, HostErrorKind, HostEvent, Result, SpeechCapability, Utterance,
    VoiceDescriptor,
};

use super::HOST_EVENT_CAPACITY;

/// Primitive invoked on the host
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Enqueue(Utterance),
    Pause,
    Resume,
    CancelAll,
}

#[derive(Default)]
struct ScriptedState {
    available: bool,
    voices: Vec<VoiceDescriptor>,
    calls: Vec<HostCall>,
    current: Option<Utterance>,
    paused: bool,
    fail_next_enqueue: Option<String>,
}

/// Fake host driven step by step
pub struct ScriptedSpeech {
    state: Mutex<ScriptedState>,
    events: broadcast::Sender<HostEvent>,
}

impl ScriptedSpeech {
    pub fn new(voices: Vec<VoiceDescriptor>) -> Self {
        let (events, _) = broadcast::channel(HOST_EVENT_CAPACITY);
        Self {
            state: Mutex::new(ScriptedState {
                available: true,
                voices,
                ..Default::default()
            }),
            events,
        }
    }

    /// Host without synthesis support
    pub fn unavailable() -> Self {
        let host = Self::new(Vec::new());
        host.state.lock().available = false;
        host
    }

    /// Replace the voice list and announce it
    pub fn set_voices(&self, voices: Vec<VoiceDescriptor>) {
        self.state.lock().voices = voices;
        self.fire(HostEvent::VoicesChanged);
    }

    /// Make the next `enqueue` fail with a synthesis error
    pub fn fail_next_enqueue(&self, message: impl Into<String>) {
        self.state.lock().fail_next_enqueue = Some(message.into());
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Every utterance enqueued so far
    pub fn enqueued(&self) -> Vec<Utterance> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                HostCall::Enqueue(utterance) => Some(utterance.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether the host is holding a pause
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Utterance occupying the host slot
    pub fn current(&self) -> Option<Utterance> {
        self.state.lock().current.clone()
    }

    /// Broadcast an arbitrary callback
    pub fn fire(&self, event: HostEvent) {
        let _ = self.events.send(event);
    }

    /// Fire `Started` for the current utterance
    pub fn start_current(&self) -> bool {
        match self.current() {
            Some(utterance) => {
                self.fire(HostEvent::Started {
                    token: utterance.token,
                });
                true
            }
            None => false,
        }
    }

    /// Fire a word boundary for the current utterance
    pub fn boundary(&self, char_index: usize) -> bool {
        match self.current() {
            Some(utterance) => {
                self.fire(HostEvent::Boundary {
                    token: utterance.token,
                    char_index,
                    kind: BoundaryKind::Word,
                });
                true
            }
            None => false,
        }
    }

    /// Finish the current utterance naturally
    pub fn end_current(&self) -> bool {
        let current = self.state.lock().current.take();
        match current {
            Some(utterance) => {
                self.fire(HostEvent::Ended {
                    token: utterance.token,
                });
                true
            }
            None => false,
        }
    }

    /// Fail the current utterance
    pub fn fail_current(&self, kind: HostErrorKind) -> bool {
        let current = self.state.lock().current.take();
        match current {
            Some(utterance) => {
                self.fire(HostEvent::Error {
                    token: utterance.token,
                    kind,
                });
                true
            }
            None => false,
        }
    }
}

impl SpeechCapability for ScriptedSpeech {
    fn is_available(&self) -> bool {
        self.state.lock().available
    }

    fn voices(&self) -> Vec<VoiceDescriptor> {
        self.state.lock().voices.clone()
    }

    fn enqueue(&self, utterance: Utterance) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::Enqueue(utterance.clone()));

        if !state.available {
            return Err(Error::HostUnavailable);
        }
        if let Some(message) = state.fail_next_enqueue.take() {
            return Err(Error::HostSynthesis(message));
        }

        state.current = Some(utterance);
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.calls.push(HostCall::Pause);
        state.paused = true;
    }

    fn resume(&self) {
        let mut state = self.state.lock();
        state.calls.push(HostCall::Resume);
        state.paused = false;
    }

    fn cancel_all(&self) {
        let dropped = {
            let mut state = self.state.lock();
            state.calls.push(HostCall::CancelAll);
            state.current.take()
        };

        if let Some(utterance) = dropped {
            self.fire(HostEvent::Error {
                token: utterance.token,
                kind: HostErrorKind::Canceled,
            });
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }
}
