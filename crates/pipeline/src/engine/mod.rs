//! Sequential playback engine
//!
//! Drives a single-utterance host one segment at a time and layers a queue,
//! transport controls and seeking on top of it.
//!
//! ## State machine
//!
//! ```text
//!            start / skip / jump_to
//!   Idle ───────────────────────────▶ Speaking ◀──── resume ──── Paused
//!    ▲                                  │  │                        ▲
//!    │   natural end / host error       │  └──────── pause ─────────┘
//!    └──────────────────────────────────┘
//!    ▲                                                            │
//!    └──────────────────────── cancel ────────────────────────────┘
//! ```
//!
//! Moving from one segment to the next happens inside `Speaking` and never
//! surfaces an intermediate `Idle`.
//!
//! ## Stale callbacks
//!
//! Every utterance carries an [`UtteranceToken`]. Operations that drop
//! in-flight audio (start, skip, jump_to, parameter changes, cancel) bump the
//! generation before calling `cancel_all`, so late callbacks from the dropped
//! utterance no longer match and are discarded.

mod events;

pub use events::{EngineConfig, PlaybackEvent};

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;

use voz_libro_core::{
    BoundaryKind, Error, HostEvent, PlaybackState, PlaybackStatus, Result, Segment,
    SpeechCapability, Utterance, UtteranceToken,
};

use crate::chunker::SegmentCache;

struct EngineInner {
    state: PlaybackState,
    cache: SegmentCache,
    generation: u64,
}

/// Playback engine, sole owner of the host's utterance slot
pub struct PlaybackEngine {
    config: EngineConfig,
    host: Arc<dyn SpeechCapability>,
    inner: Mutex<EngineInner>,
    events: broadcast::Sender<PlaybackEvent>,
    host_rx: Mutex<Option<broadcast::Receiver<HostEvent>>>,
}

impl PlaybackEngine {
    /// Create an engine bound to a host
    pub fn new(host: Arc<dyn SpeechCapability>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let host_rx = host.subscribe();

        let state = PlaybackState {
            rate: config.default_rate,
            volume: config.default_volume,
            ..Default::default()
        };

        Self {
            config,
            host,
            inner: Mutex::new(EngineInner {
                state,
                cache: SegmentCache::new(),
                generation: 0,
            }),
            events,
            host_rx: Mutex::new(Some(host_rx)),
        }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Whether the host can synthesize at all
    pub fn is_available(&self) -> bool {
        self.host.is_available()
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state.clone()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.inner.lock().state.status
    }

    pub fn current_index(&self) -> usize {
        self.inner.lock().state.current_index
    }

    pub fn total_segments(&self) -> usize {
        self.inner.lock().cache.segments().len()
    }

    pub fn segments(&self) -> Arc<[Segment]> {
        self.inner.lock().cache.segments()
    }

    pub fn current_segment(&self) -> Option<Segment> {
        let inner = self.inner.lock();
        inner.cache.segments().get(inner.state.current_index).cloned()
    }

    /// How many times source text was chunked
    pub fn chunk_computations(&self) -> usize {
        self.inner.lock().cache.computations()
    }

    /// Begin playback of `text` at segment `at_index` (clamped)
    pub fn start(&self, text: &str, at_index: usize) -> Result<()> {
        if !self.host.is_available() {
            return Err(Error::HostUnavailable);
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let segments = inner.cache.get_or_segment(text);
        if segments.is_empty() {
            tracing::warn!("No speakable segments in text, playback not started");
            return Err(Error::EmptyContent);
        }

        let index = at_index.min(segments.len() - 1);
        tracing::info!(
            segments = segments.len(),
            requested = at_index,
            index,
            "Starting playback"
        );

        self.supersede(inner);
        inner.state.current_index = index;
        self.set_status(inner, PlaybackStatus::Speaking);
        self.speak_current(inner)
    }

    /// Suspend the in-flight utterance
    pub fn pause(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.state.status != PlaybackStatus::Speaking {
            return Err(Error::InvalidTransition {
                operation: "pause",
                status: inner.state.status,
            });
        }

        self.host.pause();
        self.set_status(inner, PlaybackStatus::Paused);
        Ok(())
    }

    /// Continue the suspended utterance where it stopped
    pub fn resume(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.state.status != PlaybackStatus::Paused {
            return Err(Error::InvalidTransition {
                operation: "resume",
                status: inner.state.status,
            });
        }

        self.host.resume();
        self.set_status(inner, PlaybackStatus::Speaking);
        Ok(())
    }

    /// Move by `delta` segments (clamped); returns the resulting index
    pub fn skip(&self, delta: isize) -> Result<usize> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let current = inner.state.current_index;
        let target = if delta < 0 {
            current.saturating_sub(delta.unsigned_abs())
        } else {
            current.saturating_add(delta as usize)
        };

        self.seek(inner, target, false)
    }

    /// Seek to an absolute segment (clamped) and (re)start it
    pub fn jump_to(&self, index: usize) -> Result<usize> {
        let mut guard = self.inner.lock();
        self.seek(&mut guard, index, true)
    }

    /// Change the speaking rate; restarts the current segment when speaking
    pub fn set_rate(&self, rate: f32) -> Result<()> {
        let rate = if rate.is_finite() {
            rate.clamp(self.config.min_rate, self.config.max_rate)
        } else {
            self.config.default_rate
        };

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state.rate == rate {
            return Ok(());
        }

        tracing::debug!(rate, "Rate changed");
        inner.state.rate = rate;
        self.restart_if_speaking(inner)
    }

    /// Change the volume (0..=1); restarts the current segment when speaking
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            self.config.default_volume
        };

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state.volume == volume {
            return Ok(());
        }

        tracing::debug!(volume, "Volume changed");
        inner.state.volume = volume;
        self.restart_if_speaking(inner)
    }

    /// Change the voice; restarts the current segment when speaking
    pub fn set_voice(&self, voice_id: Option<String>) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state.voice_id == voice_id {
            return Ok(());
        }

        tracing::debug!(voice = ?voice_id, "Voice changed");
        inner.state.voice_id = voice_id;
        self.restart_if_speaking(inner)
    }

    /// Full teardown: stop audio, forget the text, rewind to 0
    pub fn cancel(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        self.supersede(inner);
        inner.state.current_index = 0;
        inner.state.char_offset = 0;
        inner.cache.clear();
        self.set_status(inner, PlaybackStatus::Idle);
        tracing::debug!(generation = inner.generation, "Playback cancelled");
    }

    /// Apply one host callback
    pub fn handle_host_event(&self, event: HostEvent) {
        let Some(token) = event.token() else {
            return;
        };

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.state.status == PlaybackStatus::Idle
            || token.generation != inner.generation
            || token.index != inner.state.current_index
        {
            tracing::trace!(
                generation = token.generation,
                index = token.index,
                current_generation = inner.generation,
                "Ignoring stale host callback"
            );
            return;
        }

        match event {
            HostEvent::Started { .. } => {
                tracing::debug!(index = token.index, "Utterance started");
            }
            HostEvent::Boundary {
                char_index, kind, ..
            } => {
                if matches!(kind, BoundaryKind::Word | BoundaryKind::Sentence) {
                    inner.state.char_offset = char_index;
                    self.emit(PlaybackEvent::Boundary {
                        index: token.index,
                        char_offset: char_index,
                    });
                }
            }
            HostEvent::Ended { .. } => self.advance(inner),
            HostEvent::Error { kind, .. } => {
                if kind.is_transient() {
                    tracing::debug!(index = token.index, ?kind, "Swallowed transient interruption");
                } else {
                    tracing::warn!(index = token.index, ?kind, "Speech synthesis error");
                    self.fail(inner, kind.into());
                }
            }
            HostEvent::VoicesChanged => {}
        }
    }

    /// Drain pending host callbacks without blocking
    ///
    /// Returns the number of callbacks applied. Does nothing once [`run`]
    /// has taken over the host subscription.
    ///
    /// [`run`]: PlaybackEngine::run
    pub fn pump(&self) -> usize {
        let mut processed = 0;
        loop {
            let next = {
                let mut guard = self.host_rx.lock();
                match guard.as_mut() {
                    Some(rx) => rx.try_recv(),
                    None => return processed,
                }
            };

            match next {
                Ok(event) => {
                    self.handle_host_event(event);
                    processed += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Host event receiver lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return processed,
            }
        }
    }

    /// Apply host callbacks as they arrive
    pub async fn run(self: Arc<Self>) {
        let Some(mut rx) = self.host_rx.lock().take() else {
            tracing::warn!("Engine event loop already running");
            return;
        };

        loop {
            match rx.recv().await {
                Ok(event) => self.handle_host_event(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Host event receiver lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }

        tracing::debug!("Host event channel closed");
    }

    /// Spawn [`run`](PlaybackEngine::run) on the current runtime
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }

    fn set_status(&self, inner: &mut EngineInner, new: PlaybackStatus) {
        let old = inner.state.status;
        if old != new {
            inner.state.status = new;
            self.emit(PlaybackEvent::StateChanged { old, new });
        }
    }

    /// Invalidate in-flight callbacks and clear the host slot
    fn supersede(&self, inner: &mut EngineInner) {
        inner.generation += 1;
        self.host.cancel_all();
        self.release_pause(inner);
    }

    /// Hosts keep their pause across `cancel_all`
    fn release_pause(&self, inner: &EngineInner) {
        if inner.state.status == PlaybackStatus::Paused {
            self.host.resume();
        }
    }

    fn seek(&self, inner: &mut EngineInner, target: usize, force: bool) -> Result<usize> {
        let total = inner.cache.segments().len();
        if total == 0 {
            return Err(Error::EmptyContent);
        }

        let target = target.min(total - 1);
        if target == inner.state.current_index && !force {
            return Ok(target);
        }

        tracing::debug!(from = inner.state.current_index, to = target, "Seeking");
        self.supersede(inner);
        inner.state.current_index = target;
        self.set_status(inner, PlaybackStatus::Speaking);
        self.speak_current(inner)?;
        Ok(target)
    }

    fn restart_if_speaking(&self, inner: &mut EngineInner) -> Result<()> {
        if inner.state.status != PlaybackStatus::Speaking {
            return Ok(());
        }
        self.supersede(inner);
        self.speak_current(inner)
    }

    /// Hand the current segment to the host
    fn speak_current(&self, inner: &mut EngineInner) -> Result<()> {
        let index = inner.state.current_index;
        let segments = inner.cache.segments();
        let Some(segment) = segments.get(index) else {
            return Err(Error::EmptyContent);
        };

        let utterance = Utterance {
            token: UtteranceToken {
                generation: inner.generation,
                index,
            },
            text: segment.text.clone(),
            rate: inner.state.rate,
            volume: inner.state.volume,
            voice_id: inner.state.voice_id.clone(),
        };
        inner.state.char_offset = 0;

        match self.host.enqueue(utterance) {
            Ok(()) => {
                tracing::debug!(index, generation = inner.generation, "Queued segment");
                self.emit(PlaybackEvent::SegmentStarted { index });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(index, error = %err, "Host rejected utterance");
                self.fail(inner, err.clone());
                Err(err)
            }
        }
    }

    /// Current utterance finished: next segment or natural end
    fn advance(&self, inner: &mut EngineInner) {
        let next = inner.state.current_index + 1;
        if next < inner.cache.segments().len() {
            inner.state.current_index = next;
            // enqueue failures are already reported by speak_current
            let _ = self.speak_current(inner);
        } else {
            tracing::info!(segments = next, "Playback finished");
            self.set_status(inner, PlaybackStatus::Idle);
            self.emit(PlaybackEvent::Ended);
        }
    }

    fn fail(&self, inner: &mut EngineInner, err: Error) {
        inner.generation += 1;
        self.release_pause(inner);
        self.emit(PlaybackEvent::Error(err));
        self.set_status(inner, PlaybackStatus::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostCall, ScriptedSpeech};
    use std::time::Duration;
    use voz_libro_core::HostErrorKind;

    const TEN: &str = "Uno. Dos. Tres. Cuatro. Cinco. Seis. Siete. Ocho. Nueve. Diez.";

    fn setup() -> (
        Arc<ScriptedSpeech>,
        PlaybackEngine,
        broadcast::Receiver<PlaybackEvent>,
    ) {
        let host = Arc::new(ScriptedSpeech::new(Vec::new()));
        let engine = PlaybackEngine::new(host.clone(), EngineConfig::default());
        let rx = engine.subscribe();
        (host, engine, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn started(events: &[PlaybackEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|event| match event {
                PlaybackEvent::SegmentStarted { index } => Some(*index),
                _ => None,
            })
            .collect()
    }

    fn finish_current(host: &ScriptedSpeech, engine: &PlaybackEngine) {
        assert!(host.end_current());
        engine.pump();
    }

    #[test]
    fn test_start_at_index_skips_earlier_segments() {
        let (host, engine, mut rx) = setup();
        engine.start("Hola. Adios.", 1).unwrap();

        let events = drain(&mut rx);
        assert_eq!(started(&events), vec![1]);
        assert_eq!(engine.status(), PlaybackStatus::Speaking);
        assert_eq!(host.current().unwrap().text, "Adios.");
    }

    #[test]
    fn test_start_empty_text_fails() {
        let (host, engine, mut rx) = setup();
        assert_eq!(engine.start("", 0), Err(Error::EmptyContent));
        assert_eq!(engine.start("  \n ", 0), Err(Error::EmptyContent));

        assert_eq!(engine.status(), PlaybackStatus::Idle);
        assert!(drain(&mut rx).is_empty());
        assert!(host.enqueued().is_empty());
    }

    #[test]
    fn test_start_without_host() {
        let host = Arc::new(ScriptedSpeech::unavailable());
        let engine = PlaybackEngine::new(host, EngineConfig::default());
        assert_eq!(engine.start("Hola.", 0), Err(Error::HostUnavailable));
        assert!(!engine.is_available());
    }

    #[test]
    fn test_start_clamps_index() {
        let (_host, engine, _rx) = setup();
        engine.start("Uno. Dos. Tres.", 42).unwrap();
        assert_eq!(engine.current_index(), 2);
    }

    #[test]
    fn test_natural_progression_without_idle_flicker() {
        let (host, engine, mut rx) = setup();
        engine.start("Uno. Dos. Tres.", 0).unwrap();

        finish_current(&host, &engine);
        finish_current(&host, &engine);
        assert_eq!(engine.current_index(), 2);
        assert_eq!(engine.status(), PlaybackStatus::Speaking);

        finish_current(&host, &engine);
        assert_eq!(engine.status(), PlaybackStatus::Idle);

        let events = drain(&mut rx);
        assert_eq!(started(&events), vec![0, 1, 2]);

        let transitions: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, PlaybackEvent::StateChanged { .. }))
            .collect();
        assert_eq!(transitions.len(), 2);

        let ended = events
            .iter()
            .filter(|event| matches!(event, PlaybackEvent::Ended))
            .count();
        assert_eq!(ended, 1);
        assert_eq!(events.last(), Some(&PlaybackEvent::Ended));
    }

    #[test]
    fn test_duplicate_end_after_finish_is_ignored() {
        let (host, engine, mut rx) = setup();
        engine.start("Solo una.", 0).unwrap();
        let token = host.current().unwrap().token;

        finish_current(&host, &engine);
        host.fire(HostEvent::Ended { token });
        engine.pump();

        let ended = drain(&mut rx)
            .into_iter()
            .filter(|event| matches!(event, PlaybackEvent::Ended))
            .count();
        assert_eq!(ended, 1);
    }

    #[test]
    fn test_pause_resume_does_not_restart_segment() {
        let (host, engine, mut rx) = setup();
        engine.start("Uno. Dos.", 0).unwrap();
        drain(&mut rx);

        engine.pause().unwrap();
        assert_eq!(engine.status(), PlaybackStatus::Paused);
        engine.resume().unwrap();
        assert_eq!(engine.status(), PlaybackStatus::Speaking);

        let events = drain(&mut rx);
        assert!(started(&events).is_empty());
        assert_eq!(host.enqueued().len(), 1);

        let calls = host.calls();
        assert!(calls.contains(&HostCall::Pause));
        assert!(calls.contains(&HostCall::Resume));

        // Same utterance keeps going after resume
        finish_current(&host, &engine);
        assert_eq!(engine.current_index(), 1);
    }

    #[test]
    fn test_skip_from_paused_releases_host_pause() {
        let (host, engine, mut rx) = setup();
        engine.start("Uno. Dos. Tres.", 0).unwrap();
        engine.pause().unwrap();
        drain(&mut rx);

        assert_eq!(engine.skip(1), Ok(1));
        assert_eq!(engine.status(), PlaybackStatus::Speaking);
        assert!(!host.is_paused());
        assert_eq!(started(&drain(&mut rx)), vec![1]);

        engine.pause().unwrap();
        assert_eq!(engine.jump_to(2), Ok(2));
        assert!(!host.is_paused());

        // Resume must follow the cancel, before the new utterance
        let calls = host.calls();
        let tail = &calls[calls.len() - 3..];
        assert_eq!(tail[0], HostCall::CancelAll);
        assert_eq!(tail[1], HostCall::Resume);
        assert!(matches!(&tail[2], HostCall::Enqueue(u) if u.token.index == 2));
    }

    #[test]
    fn test_start_and_cancel_from_paused_release_host_pause() {
        let (host, engine, _rx) = setup();
        engine.start("Uno. Dos.", 0).unwrap();
        engine.pause().unwrap();

        engine.start("Otro. Texto.", 1).unwrap();
        assert_eq!(engine.status(), PlaybackStatus::Speaking);
        assert!(!host.is_paused());

        engine.pause().unwrap();
        engine.cancel();
        assert_eq!(engine.status(), PlaybackStatus::Idle);
        assert!(!host.is_paused());
    }

    #[test]
    fn test_invalid_transitions() {
        let (_host, engine, _rx) = setup();
        assert_eq!(
            engine.pause(),
            Err(Error::InvalidTransition {
                operation: "pause",
                status: PlaybackStatus::Idle
            })
        );

        engine.start("Uno.", 0).unwrap();
        assert!(matches!(
            engine.resume(),
            Err(Error::InvalidTransition { operation: "resume", .. })
        ));

        engine.pause().unwrap();
        assert!(engine.pause().is_err());
    }

    #[test]
    fn test_skip_back_at_start_clamps() {
        let (host, engine, mut rx) = setup();
        engine.start("Uno. Dos. Tres.", 0).unwrap();
        drain(&mut rx);

        assert_eq!(engine.skip(-1).unwrap(), 0);
        assert_eq!(engine.status(), PlaybackStatus::Speaking);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(host.enqueued().len(), 1);
    }

    #[test]
    fn test_skip_forward_at_end_clamps_without_ending() {
        let (_host, engine, mut rx) = setup();
        engine.start("Uno. Dos. Tres.", 2).unwrap();
        drain(&mut rx);

        assert_eq!(engine.skip(1).unwrap(), 2);
        let events = drain(&mut rx);
        assert!(!events.contains(&PlaybackEvent::Ended));
        assert_eq!(engine.status(), PlaybackStatus::Speaking);
    }

    #[test]
    fn test_skip_discards_stale_callbacks() {
        let (host, engine, mut rx) = setup();
        engine.start(TEN, 0).unwrap();
        let stale = host.current().unwrap().token;

        assert_eq!(engine.skip(2).unwrap(), 2);
        host.fire(HostEvent::Ended { token: stale });
        host.fire(HostEvent::Error {
            token: stale,
            kind: HostErrorKind::Synthesis("late".into()),
        });
        engine.pump();

        assert_eq!(engine.current_index(), 2);
        assert_eq!(engine.status(), PlaybackStatus::Speaking);
        let events = drain(&mut rx);
        assert_eq!(started(&events), vec![0, 2]);
        assert!(!events
            .iter()
            .any(|event| matches!(event, PlaybackEvent::Error(_))));
    }

    #[test]
    fn test_skip_from_paused_resumes_speaking() {
        let (_host, engine, _rx) = setup();
        engine.start(TEN, 0).unwrap();
        engine.pause().unwrap();

        assert_eq!(engine.skip(3).unwrap(), 3);
        assert_eq!(engine.status(), PlaybackStatus::Speaking);
    }

    #[test]
    fn test_jump_to_is_idempotent() {
        let (host, engine, mut rx) = setup();
        engine.start(TEN, 0).unwrap();
        drain(&mut rx);

        assert_eq!(engine.jump_to(3).unwrap(), 3);
        assert_eq!(engine.jump_to(3).unwrap(), 3);

        let events = drain(&mut rx);
        assert_eq!(started(&events), vec![3, 3]);
        assert_eq!(engine.current_index(), 3);
        assert_eq!(host.current().unwrap().token.index, 3);

        assert_eq!(engine.jump_to(99).unwrap(), 9);
    }

    #[test]
    fn test_seek_without_content() {
        let (_host, engine, _rx) = setup();
        assert_eq!(engine.skip(1), Err(Error::EmptyContent));
        assert_eq!(engine.jump_to(0), Err(Error::EmptyContent));
    }

    #[test]
    fn test_set_rate_restarts_current_segment() {
        let (host, engine, mut rx) = setup();
        engine.start(TEN, 0).unwrap();
        engine.jump_to(2).unwrap();
        drain(&mut rx);
        host.clear_calls();

        engine.set_rate(1.5).unwrap();

        let events = drain(&mut rx);
        assert_eq!(started(&events), vec![2]);
        assert_eq!(engine.current_index(), 2);

        let calls = host.calls();
        assert_eq!(calls.first(), Some(&HostCall::CancelAll));
        let utterance = host.current().unwrap();
        assert_eq!(utterance.token.index, 2);
        assert_eq!(utterance.rate, 1.5);
    }

    #[test]
    fn test_set_rate_while_paused_applies_to_next_segment() {
        let (host, engine, mut rx) = setup();
        engine.start("Uno. Dos.", 0).unwrap();
        engine.pause().unwrap();
        drain(&mut rx);

        engine.set_rate(2.0).unwrap();
        assert!(started(&drain(&mut rx)).is_empty());
        assert_eq!(host.current().unwrap().rate, 1.0);

        engine.resume().unwrap();
        finish_current(&host, &engine);
        assert_eq!(host.current().unwrap().rate, 2.0);
    }

    #[test]
    fn test_parameters_are_clamped() {
        let (_host, engine, _rx) = setup();
        engine.set_volume(3.0).unwrap();
        engine.set_rate(50.0).unwrap();
        let state = engine.state();
        assert_eq!(state.volume, 1.0);
        assert_eq!(state.rate, 10.0);

        engine.set_rate(f32::NAN).unwrap();
        assert_eq!(engine.state().rate, 1.0);
    }

    #[test]
    fn test_unchanged_parameter_does_not_restart() {
        let (host, engine, mut rx) = setup();
        engine.start("Uno. Dos.", 0).unwrap();
        drain(&mut rx);

        engine.set_volume(1.0).unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(host.enqueued().len(), 1);
    }

    #[test]
    fn test_set_voice_restarts_with_voice() {
        let (host, engine, mut rx) = setup();
        engine.start("Uno. Dos.", 1).unwrap();
        drain(&mut rx);

        engine.set_voice(Some("es-mx-paulina".into())).unwrap();
        assert_eq!(started(&drain(&mut rx)), vec![1]);
        assert_eq!(
            host.current().unwrap().voice_id.as_deref(),
            Some("es-mx-paulina")
        );
    }

    #[test]
    fn test_cancel_resets_everything() {
        let (host, engine, _rx) = setup();
        engine.start(TEN, 4).unwrap();
        engine.cancel();

        let state = engine.state();
        assert_eq!(state.status, PlaybackStatus::Idle);
        assert_eq!(state.current_index, 0);
        assert_eq!(engine.total_segments(), 0);
        assert!(host.current().is_none());

        engine.start(TEN, 0).unwrap();
        assert_eq!(engine.chunk_computations(), 2);
    }

    #[test]
    fn test_restart_same_text_reuses_segments() {
        let (_host, engine, _rx) = setup();
        engine.start(TEN, 0).unwrap();
        engine.start(TEN, 5).unwrap();
        assert_eq!(engine.chunk_computations(), 1);
        assert_eq!(engine.current_index(), 5);

        engine.start("Otro libro.", 0).unwrap();
        assert_eq!(engine.chunk_computations(), 2);
        assert_eq!(engine.total_segments(), 1);
    }

    #[test]
    fn test_host_error_returns_to_idle() {
        let (host, engine, mut rx) = setup();
        engine.start("Uno. Dos.", 0).unwrap();
        drain(&mut rx);

        host.fail_current(HostErrorKind::Synthesis("audio-hardware".into()));
        engine.pump();

        assert_eq!(engine.status(), PlaybackStatus::Idle);
        let events = drain(&mut rx);
        let errors = events
            .iter()
            .filter(|event| matches!(event, PlaybackEvent::Error(_)))
            .count();
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_transient_error_on_current_is_swallowed() {
        let (host, engine, mut rx) = setup();
        engine.start("Uno. Dos.", 0).unwrap();
        drain(&mut rx);

        let token = host.current().unwrap().token;
        host.fire(HostEvent::Error {
            token,
            kind: HostErrorKind::Interrupted,
        });
        engine.pump();

        assert_eq!(engine.status(), PlaybackStatus::Speaking);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_enqueue_failure_is_reported() {
        let (host, engine, mut rx) = setup();
        host.fail_next_enqueue("no audio output");

        assert!(matches!(
            engine.start("Uno.", 0),
            Err(Error::HostSynthesis(_))
        ));
        assert_eq!(engine.status(), PlaybackStatus::Idle);
        assert!(drain(&mut rx)
            .iter()
            .any(|event| matches!(event, PlaybackEvent::Error(_))));
    }

    #[test]
    fn test_boundaries_update_char_offset() {
        let (host, engine, mut rx) = setup();
        engine.start("Una frase larga. Otra.", 0).unwrap();
        drain(&mut rx);

        host.boundary(4);
        host.fire(HostEvent::Boundary {
            token: host.current().unwrap().token,
            char_index: 9,
            kind: BoundaryKind::Other,
        });
        engine.pump();

        assert_eq!(engine.state().char_offset, 4);
        assert_eq!(
            drain(&mut rx),
            vec![PlaybackEvent::Boundary {
                index: 0,
                char_offset: 4
            }]
        );

        finish_current(&host, &engine);
        assert_eq!(engine.state().char_offset, 0);
    }

    #[tokio::test]
    async fn test_run_loop_advances() {
        let host = Arc::new(ScriptedSpeech::new(Vec::new()));
        let engine = Arc::new(PlaybackEngine::new(host.clone(), EngineConfig::default()));
        let mut rx = engine.subscribe();
        let task = engine.spawn();

        engine.start("Uno. Dos.", 0).unwrap();
        host.end_current();

        let advanced = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Ok(PlaybackEvent::SegmentStarted { index: 1 }) = rx.recv().await {
                    break;
                }
            }
        })
        .await;
        assert!(advanced.is_ok());
        assert_eq!(engine.pump(), 0);

        task.abort();
    }
}
