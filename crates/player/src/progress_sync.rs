//! Progress synchronization
//!
//! Writes the reading position of one book to the progress store once the
//! position has been stable for a quiescence window, and decides where
//! playback resumes when a book is (re)opened.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use voz_libro_core::{progress_percent, PlaybackStatus, ProgressRecord, ProgressStore, Result};
use voz_libro_pipeline::{PlaybackEngine, PlaybackEvent};

/// Where playback was started by [`ProgressSynchronizer::reconcile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Engine already active, the local session wins
    Skipped,
    /// Started at the stored position
    Stored(usize),
    /// Started at the local position (no record, or the fetch failed)
    Local(usize),
}

/// Debounced progress writer for one book
pub struct ProgressSynchronizer {
    book_id: String,
    engine: Arc<PlaybackEngine>,
    store: Arc<dyn ProgressStore>,
    debounce: Duration,
    last_written: Mutex<Option<ProgressRecord>>,
}

impl ProgressSynchronizer {
    pub fn new(
        book_id: impl Into<String>,
        engine: Arc<PlaybackEngine>,
        store: Arc<dyn ProgressStore>,
        debounce: Duration,
    ) -> Self {
        Self {
            book_id: book_id.into(),
            engine,
            store,
            debounce,
            last_written: Mutex::new(None),
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    /// Last record written successfully
    pub fn last_written(&self) -> Option<ProgressRecord> {
        self.last_written.lock().clone()
    }

    /// Start playback at the best known position
    ///
    /// Does nothing while the engine is active. A failed fetch falls back to
    /// `local_position`.
    pub async fn reconcile(&self, text: &str, local_position: usize) -> Result<Reconciliation> {
        if self.engine.status().is_active() {
            tracing::debug!(book_id = %self.book_id, "Engine active, skipping reconcile");
            return Ok(Reconciliation::Skipped);
        }

        let stored = match self.store.fetch(&self.book_id).await {
            Ok(record) => record.map(|record| record.last_position),
            Err(err) => {
                tracing::warn!(
                    book_id = %self.book_id,
                    error = %err,
                    "Progress fetch failed, using local position"
                );
                None
            }
        };

        // Another caller may have started playback while we were fetching
        if self.engine.status().is_active() {
            return Ok(Reconciliation::Skipped);
        }

        let position = stored.unwrap_or(local_position);
        self.engine.start(text, position)?;

        let index = self.engine.current_index();
        tracing::info!(
            book_id = %self.book_id,
            stored = ?stored,
            local_position,
            index,
            "Playback reconciled"
        );

        Ok(match stored {
            Some(_) => Reconciliation::Stored(index),
            None => Reconciliation::Local(index),
        })
    }

    /// Write the current position if the engine is speaking
    ///
    /// Failures are logged and returned; they are never retried.
    pub async fn flush(&self) -> Result<Option<ProgressRecord>> {
        let state = self.engine.state();
        let total = self.engine.total_segments();
        if state.status != PlaybackStatus::Speaking || total == 0 {
            return Ok(None);
        }

        let record = ProgressRecord {
            book_id: self.book_id.clone(),
            last_position: state.current_index,
            progress_percent: progress_percent(state.current_index, total),
        };

        match self
            .store
            .update_progress(&record.book_id, record.last_position, record.progress_percent)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    book_id = %record.book_id,
                    position = record.last_position,
                    percent = record.progress_percent,
                    "Progress written"
                );
                *self.last_written.lock() = Some(record.clone());
                Ok(Some(record))
            }
            Err(err) => {
                tracing::warn!(
                    book_id = %self.book_id,
                    position = record.last_position,
                    error = %err,
                    "PersistenceWriteFailure"
                );
                Err(err)
            }
        }
    }

    /// Spawn the debounced writer
    ///
    /// Subscribes before spawning so events emitted right after this call are
    /// not missed.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let events = self.engine.subscribe();
        tokio::spawn(Arc::clone(self).run_with(events))
    }

    /// Debounced writer loop
    pub async fn run(self: Arc<Self>) {
        let events = self.engine.subscribe();
        self.run_with(events).await
    }

    async fn run_with(self: Arc<Self>, mut events: broadcast::Receiver<PlaybackEvent>) {
        let mut speaking = self.engine.status() == PlaybackStatus::Speaking;
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(PlaybackEvent::SegmentStarted { .. }) => {
                        if speaking {
                            deadline = Some(Instant::now() + self.debounce);
                        }
                    }
                    Ok(PlaybackEvent::StateChanged { new, .. }) => {
                        speaking = new == PlaybackStatus::Speaking;
                        deadline = speaking.then(|| Instant::now() + self.debounce);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Progress writer lagged behind engine events");
                        speaking = self.engine.status() == PlaybackStatus::Speaking;
                        if speaking {
                            deadline = Some(Instant::now() + self.debounce);
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    // failures are logged by flush
                    let _ = self.flush().await;
                }
            }
        }

        tracing::debug!(book_id = %self.book_id, "Progress writer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voz_libro_persistence::InMemoryProgressStore;
    use voz_libro_pipeline::{EngineConfig, ScriptedSpeech};

    const TEXT: &str = "Uno. Dos. Tres. Cuatro.";

    fn setup() -> (
        Arc<ScriptedSpeech>,
        Arc<PlaybackEngine>,
        Arc<InMemoryProgressStore>,
        ProgressSynchronizer,
    ) {
        let host = Arc::new(ScriptedSpeech::new(Vec::new()));
        let engine = Arc::new(PlaybackEngine::new(host.clone(), EngineConfig::default()));
        let store = Arc::new(InMemoryProgressStore::new());
        let sync = ProgressSynchronizer::new(
            "libro-1",
            engine.clone(),
            store.clone(),
            Duration::from_secs(2),
        );
        (host, engine, store, sync)
    }

    #[tokio::test]
    async fn test_reconcile_prefers_stored_position() {
        let (_host, engine, store, sync) = setup();
        store.insert(ProgressRecord::new("libro-1", 2, 4));

        let outcome = sync.reconcile(TEXT, 0).await.unwrap();
        assert_eq!(outcome, Reconciliation::Stored(2));
        assert_eq!(engine.current_index(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_uses_local_without_record() {
        let (_host, engine, _store, sync) = setup();
        assert_eq!(sync.reconcile(TEXT, 1).await.unwrap(), Reconciliation::Local(1));
        assert_eq!(engine.current_index(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_skipped_while_active() {
        let (_host, engine, store, sync) = setup();
        engine.start(TEXT, 3).unwrap();
        store.insert(ProgressRecord::new("libro-1", 0, 4));

        assert_eq!(sync.reconcile(TEXT, 0).await.unwrap(), Reconciliation::Skipped);
        assert_eq!(engine.current_index(), 3);

        engine.pause().unwrap();
        assert_eq!(sync.reconcile(TEXT, 0).await.unwrap(), Reconciliation::Skipped);
        assert_eq!(engine.status(), PlaybackStatus::Paused);
    }

    #[tokio::test]
    async fn test_flush_only_while_speaking() {
        let (_host, engine, store, sync) = setup();
        assert_eq!(sync.flush().await.unwrap(), None);

        engine.start(TEXT, 1).unwrap();
        let record = sync.flush().await.unwrap().unwrap();
        assert_eq!(record.last_position, 1);
        assert_eq!(record.progress_percent, 25);
        assert_eq!(sync.last_written(), Some(record));

        engine.pause().unwrap();
        assert_eq!(sync.flush().await.unwrap(), None);
        assert_eq!(store.write_count(), 1);
    }
}
