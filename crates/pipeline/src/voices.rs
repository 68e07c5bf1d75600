//! Voice registry
//!
//! Keeps a ranked snapshot of the host voices for the configured language and
//! remembers the user's choice in the key-value store.

use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use voz_libro_config::VoiceConfig;
use voz_libro_core::{Error, HostEvent, KeyValueStore, Result, SpeechCapability, VoiceDescriptor};

#[derive(Default)]
struct RegistryInner {
    ranked: Vec<VoiceDescriptor>,
    selected: Option<String>,
}

/// Ranked voice list plus the persisted selection
pub struct VoiceRegistry {
    config: VoiceConfig,
    host: Arc<dyn SpeechCapability>,
    store: Arc<dyn KeyValueStore>,
    inner: RwLock<RegistryInner>,
    selection: watch::Sender<Option<String>>,
    host_rx: Mutex<Option<broadcast::Receiver<HostEvent>>>,
}

impl VoiceRegistry {
    /// Create a registry and load the current host voices
    pub fn new(
        host: Arc<dyn SpeechCapability>,
        store: Arc<dyn KeyValueStore>,
        config: VoiceConfig,
    ) -> Self {
        let host_rx = host.subscribe();
        let (selection, _) = watch::channel(None);
        let registry = Self {
            config,
            host,
            store,
            inner: RwLock::new(RegistryInner::default()),
            selection,
            host_rx: Mutex::new(Some(host_rx)),
        };
        registry.refresh();
        registry
    }

    /// Re-read the host voices and re-apply the selection policy
    pub fn refresh(&self) {
        let all = self.host.voices();
        let mut candidates: Vec<VoiceDescriptor> = all
            .iter()
            .filter(|voice| voice.speaks(&self.config.language))
            .cloned()
            .collect();

        if candidates.is_empty() && !all.is_empty() {
            tracing::info!(
                language = %self.config.language,
                available = all.len(),
                "No voices for language, offering every host voice"
            );
            candidates = all;
        }

        candidates.sort_by(|a, b| self.compare(a, b));

        let mut inner = self.inner.write();
        let previous = inner.selected.clone();
        let available = |id: &String| candidates.iter().any(|voice| &voice.id == id);

        let selected = previous
            .clone()
            .filter(|id| available(id))
            .or_else(|| {
                self.store
                    .get(&self.config.storage_key)
                    .filter(|id| available(id))
            })
            .or_else(|| candidates.first().map(|voice| voice.id.clone()));

        tracing::debug!(
            voices = candidates.len(),
            selected = ?selected,
            "Voice list refreshed"
        );

        inner.ranked = candidates;
        inner.selected = selected.clone();
        drop(inner);

        if selected != previous {
            if let Some(id) = &selected {
                self.persist(id);
            }
            self.selection.send_replace(selected);
        }
    }

    /// Ranked voices exposed to the picker (capped)
    pub fn list_voices(&self) -> Vec<VoiceDescriptor> {
        self.inner
            .read()
            .ranked
            .iter()
            .take(self.config.max_listed)
            .cloned()
            .collect()
    }

    /// Every candidate voice, ranked
    pub fn all_voices(&self) -> Vec<VoiceDescriptor> {
        self.inner.read().ranked.clone()
    }

    /// Currently selected voice
    pub fn selected(&self) -> Option<VoiceDescriptor> {
        let inner = self.inner.read();
        let id = inner.selected.as_ref()?;
        inner.ranked.iter().find(|voice| &voice.id == id).cloned()
    }

    pub fn selected_id(&self) -> Option<String> {
        self.inner.read().selected.clone()
    }

    /// Watch the selected voice id
    ///
    /// Changes whenever a pick or a host voice refresh moves the selection.
    pub fn watch_selection(&self) -> watch::Receiver<Option<String>> {
        self.selection.subscribe()
    }

    /// Select a voice by id and persist the choice
    pub fn select_voice(&self, id: &str) -> Result<VoiceDescriptor> {
        let voice = self
            .inner
            .read()
            .ranked
            .iter()
            .find(|voice| voice.id == id)
            .cloned()
            .ok_or_else(|| Error::VoiceNotFound(id.to_string()))?;

        self.set_selected(&voice.id);
        Ok(voice)
    }

    /// Select the best-ranked voice matching `predicate`
    pub fn select_where<F>(&self, predicate: F) -> Option<VoiceDescriptor>
    where
        F: Fn(&VoiceDescriptor) -> bool,
    {
        let voice = self
            .inner
            .read()
            .ranked
            .iter()
            .find(|voice| predicate(voice))
            .cloned()?;

        self.set_selected(&voice.id);
        Some(voice)
    }

    /// Drain pending `VoicesChanged` notifications; returns whether a refresh ran
    pub fn pump(&self) -> bool {
        let mut changed = false;
        loop {
            let next = {
                let mut guard = self.host_rx.lock();
                match guard.as_mut() {
                    Some(rx) => rx.try_recv(),
                    None => break,
                }
            };

            match next {
                Ok(HostEvent::VoicesChanged) => changed = true,
                Ok(_) => {}
                Err(TryRecvError::Lagged(_)) => changed = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        if changed {
            self.refresh();
        }
        changed
    }

    /// Refresh whenever the host announces a new voice list
    pub async fn run(self: Arc<Self>) {
        let Some(mut rx) = self.host_rx.lock().take() else {
            tracing::warn!("Voice registry loop already running");
            return;
        };

        loop {
            match rx.recv().await {
                Ok(HostEvent::VoicesChanged) => self.refresh(),
                Ok(_) => {}
                // Lost events may have included a voice change
                Err(RecvError::Lagged(_)) => self.refresh(),
                Err(RecvError::Closed) => break,
            }
        }
    }

    fn set_selected(&self, id: &str) {
        let changed = {
            let mut inner = self.inner.write();
            if inner.selected.as_deref() == Some(id) {
                false
            } else {
                inner.selected = Some(id.to_string());
                true
            }
        };

        if changed {
            tracing::info!(voice = id, "Voice selected");
            self.persist(id);
            self.selection.send_replace(Some(id.to_string()));
        }
    }

    fn persist(&self, id: &str) {
        if let Err(err) = self.store.set(&self.config.storage_key, id) {
            tracing::warn!(voice = id, error = %err, "Failed to persist voice selection");
        }
    }

    /// Best keyword rank found in the voice name
    fn rank(&self, voice: &VoiceDescriptor) -> Option<u32> {
        let name = voice.name.to_lowercase();
        self.config
            .preferred
            .iter()
            .filter(|(keyword, _)| name.contains(&keyword.to_lowercase()))
            .map(|(_, rank)| *rank)
            .min()
    }

    fn compare(&self, a: &VoiceDescriptor, b: &VoiceDescriptor) -> Ordering {
        let rank_a = self.rank(a).unwrap_or(u32::MAX);
        let rank_b = self.rank(b).unwrap_or(u32::MAX);
        rank_a.cmp(&rank_b).then_with(|| a.name.cmp(&b.name))
    }
}
