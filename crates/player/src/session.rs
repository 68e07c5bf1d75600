//! Reader session
//!
//! Wires the playback engine, the voice registry and the progress
//! synchronizer together for the book currently open in the player, and
//! exposes the snapshot the presentation layer renders.

use parking_lot::Mutex;
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use voz_libro_config::{PlaybackConfig, Settings, VoiceConfig};
use voz_libro_core::{
    format_time, progress_percent, reading_minutes, Book, Error, KeyValueStore, PlaybackStatus,
    ProgressStore, Result, Segment, SpeechCapability, VoiceDescriptor,
};
use voz_libro_pipeline::{EngineConfig, PlaybackEngine, PlaybackEvent, VoiceRegistry};

use crate::highlight::word_range;
use crate::progress_sync::{ProgressSynchronizer, Reconciliation};

const UNAVAILABLE_REASON: &str = "La síntesis de voz no está disponible en este entorno";
const NO_BOOK_REASON: &str = "No hay ningún libro abierto";

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub playback: PlaybackConfig,
    pub voices: VoiceConfig,
    /// Quiescence window of the progress writer
    pub debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            playback: settings.playback.clone(),
            voices: settings.voices.clone(),
            debounce: settings.progress.debounce(),
        }
    }
}

/// Snapshot rendered by the player
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerView {
    pub book_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub status: PlaybackStatus,
    pub current_index: usize,
    pub total_segments: usize,
    pub char_offset: usize,
    pub rate: f32,
    pub volume: f32,
    pub selected_voice: Option<VoiceDescriptor>,
    pub voices: Vec<VoiceDescriptor>,
    pub controls_enabled: bool,
    pub disabled_reason: Option<String>,
    pub elapsed_label: String,
    pub total_label: String,
    pub progress_percent: u8,
}

struct OpenBook {
    book: Book,
    sync: Arc<ProgressSynchronizer>,
    writer: JoinHandle<()>,
}

/// Player state for one open book at a time
pub struct ReaderSession {
    config: SessionConfig,
    engine: Arc<PlaybackEngine>,
    registry: Arc<VoiceRegistry>,
    progress: Arc<dyn ProgressStore>,
    current: Mutex<Option<OpenBook>>,
    voice_rx: Mutex<watch::Receiver<Option<String>>>,
    drivers: Mutex<Vec<JoinHandle<()>>>,
}

impl ReaderSession {
    pub fn new(
        host: Arc<dyn SpeechCapability>,
        kv: Arc<dyn KeyValueStore>,
        progress: Arc<dyn ProgressStore>,
        config: SessionConfig,
    ) -> Self {
        let engine = Arc::new(PlaybackEngine::new(
            Arc::clone(&host),
            EngineConfig::from(&config.playback),
        ));
        let registry = Arc::new(VoiceRegistry::new(host, kv, config.voices.clone()));
        let voice_rx = registry.watch_selection();

        Self {
            config,
            engine,
            registry,
            progress,
            current: Mutex::new(None),
            voice_rx: Mutex::new(voice_rx),
            drivers: Mutex::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &Arc<PlaybackEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<VoiceRegistry> {
        &self.registry
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.engine.subscribe()
    }

    /// Book currently open
    pub fn book(&self) -> Option<Book> {
        self.current.lock().as_ref().map(|open| open.book.clone())
    }

    pub fn synchronizer(&self) -> Option<Arc<ProgressSynchronizer>> {
        self.current.lock().as_ref().map(|open| Arc::clone(&open.sync))
    }

    /// Spawn the engine and registry event loops on the current runtime
    ///
    /// Without them, callers drive host callbacks with [`ReaderSession::pump`].
    pub fn spawn_drivers(&self) {
        let mut drivers = self.drivers.lock();
        if !drivers.is_empty() {
            return;
        }
        drivers.push(self.engine.spawn());
        drivers.push(tokio::spawn(Arc::clone(&self.registry).run()));

        let engine = Arc::clone(&self.engine);
        let mut selection = self.registry.watch_selection();
        drivers.push(tokio::spawn(async move {
            while selection.changed().await.is_ok() {
                let voice_id = selection.borrow_and_update().clone();
                if let Err(err) = engine.set_voice(voice_id) {
                    tracing::warn!(error = %err, "Failed to apply refreshed voice");
                }
            }
        }));
    }

    /// Apply pending voice-list changes and host callbacks without blocking
    pub fn pump(&self) -> Result<usize> {
        self.registry.pump();
        self.sync_voice()?;
        Ok(self.engine.pump())
    }

    /// Hand a changed registry selection to the engine
    fn sync_voice(&self) -> Result<()> {
        let voice_id = {
            let mut rx = self.voice_rx.lock();
            if !rx.has_changed().unwrap_or(false) {
                return Ok(());
            }
            let voice_id = rx.borrow_and_update().clone();
            voice_id
        };
        self.engine.set_voice(voice_id)
    }

    /// Open a book and start playback at its best known position
    ///
    /// Opening a different book stops the previous one first. Reopening the
    /// same book while it plays leaves playback untouched.
    pub async fn open(&self, book: Book) -> Result<Reconciliation> {
        let sync = {
            let mut current = self.current.lock();
            let reopened = current
                .as_ref()
                .map_or(false, |open| open.book.id == book.id);

            if let (true, Some(open)) = (reopened, current.as_mut()) {
                open.book = book.clone();
                Arc::clone(&open.sync)
            } else {
                if let Some(previous) = current.take() {
                    previous.writer.abort();
                    self.engine.cancel();
                    tracing::info!(book_id = %previous.book.id, "Closed previous book");
                }

                let sync = Arc::new(ProgressSynchronizer::new(
                    book.id.clone(),
                    Arc::clone(&self.engine),
                    Arc::clone(&self.progress),
                    self.config.debounce,
                ));
                let writer = sync.spawn();
                *current = Some(OpenBook {
                    book: book.clone(),
                    sync: Arc::clone(&sync),
                    writer,
                });
                sync
            }
        };

        tracing::info!(book_id = %book.id, title = %book.title, "Opening book");
        self.engine.set_voice(self.registry.selected_id())?;
        sync.reconcile(&book.text_content, book.last_position).await
    }

    /// Stop playback and forget the open book
    pub fn close(&self) {
        if let Some(open) = self.current.lock().take() {
            open.writer.abort();
            tracing::info!(book_id = %open.book.id, "Book closed");
        }
        self.engine.cancel();
    }

    /// Play/pause button: start when idle, otherwise pause or resume
    pub async fn toggle_play(&self) -> Result<PlaybackStatus> {
        match self.engine.status() {
            PlaybackStatus::Idle => {
                let (sync, text, local_position) = {
                    let current = self.current.lock();
                    let open = current.as_ref().ok_or(Error::EmptyContent)?;
                    let local_position = if self.engine.total_segments() > 0 {
                        self.engine.current_index()
                    } else {
                        open.sync
                            .last_written()
                            .map(|record| record.last_position)
                            .unwrap_or(open.book.last_position)
                    };
                    (
                        Arc::clone(&open.sync),
                        open.book.text_content.clone(),
                        local_position,
                    )
                };
                sync.reconcile(&text, local_position).await?;
            }
            PlaybackStatus::Speaking => self.engine.pause()?,
            PlaybackStatus::Paused => self.engine.resume()?,
        }
        Ok(self.engine.status())
    }

    pub fn skip(&self, delta: isize) -> Result<usize> {
        self.engine.skip(delta)
    }

    pub fn jump_to(&self, index: usize) -> Result<usize> {
        self.engine.jump_to(index)
    }

    /// Select and persist a voice, restarting the current segment if speaking
    pub fn select_voice(&self, id: &str) -> Result<VoiceDescriptor> {
        let voice = self.registry.select_voice(id)?;
        self.engine.set_voice(Some(voice.id.clone()))?;
        Ok(voice)
    }

    /// Speed button: next step of the rate ladder, wrapping around
    pub fn cycle_rate(&self) -> Result<f32> {
        let steps = &self.config.playback.rate_steps;
        let rate = self.engine.state().rate;

        let next = steps
            .iter()
            .position(|step| (step - rate).abs() < f32::EPSILON)
            .map(|i| (i + 1) % steps.len())
            .unwrap_or(0);
        let next_rate = steps
            .get(next)
            .copied()
            .unwrap_or(self.config.playback.default_rate);

        self.engine.set_rate(next_rate)?;
        Ok(self.engine.state().rate)
    }

    /// Mute button: volume 0 <-> 1
    pub fn toggle_mute(&self) -> Result<f32> {
        let volume = if self.engine.state().volume == 0.0 {
            1.0
        } else {
            0.0
        };
        self.engine.set_volume(volume)?;
        Ok(volume)
    }

    /// Current segment and the byte range of the word being spoken in it
    pub fn highlight(&self) -> Option<(Segment, Range<usize>)> {
        let segment = self.engine.current_segment()?;
        let char_offset = self.engine.state().char_offset;
        let range = word_range(&segment.text, char_offset);
        Some((segment, range))
    }

    pub fn view(&self) -> PlayerView {
        let state = self.engine.state();
        let total_segments = self.engine.total_segments();
        let book = self.book();

        let disabled_reason = if !self.engine.is_available() {
            Some(UNAVAILABLE_REASON.to_string())
        } else if book.is_none() {
            Some(NO_BOOK_REASON.to_string())
        } else {
            None
        };

        let total_minutes = book
            .as_ref()
            .map(|book| reading_minutes(&book.text_content))
            .unwrap_or(0.0);
        let elapsed_minutes = if total_segments > 0 {
            total_minutes * state.current_index as f64 / total_segments as f64
        } else {
            0.0
        };

        PlayerView {
            book_id: book.as_ref().map(|book| book.id.clone()),
            title: book.as_ref().map(|book| book.title.clone()),
            author: book.as_ref().map(|book| book.author.clone()),
            status: state.status,
            current_index: state.current_index,
            total_segments,
            char_offset: state.char_offset,
            rate: state.rate,
            volume: state.volume,
            selected_voice: self.registry.selected(),
            voices: self.registry.list_voices(),
            controls_enabled: disabled_reason.is_none(),
            disabled_reason,
            elapsed_label: format_time(elapsed_minutes),
            total_label: format_time(total_minutes),
            progress_percent: progress_percent(state.current_index, total_segments),
        }
    }
}

impl Drop for ReaderSession {
    fn drop(&mut self) {
        if let Some(open) = self.current.get_mut().take() {
            open.writer.abort();
        }
        for driver in self.drivers.get_mut().drain(..) {
            driver.abort();
        }
    }
}
