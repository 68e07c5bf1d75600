//! Timer-driven speech host
//!
//! "Speaks" each utterance by emitting a word boundary per word at a fixed
//! pace scaled by the utterance rate, then `Ended`. No audio is produced; the
//! command-line player uses it to exercise the engine end to end.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use voz_libro_config::SimulatedVoice;
use voz_libro_core::{
    BoundaryKind, Error, HostErrorKind, HostEvent, Result, SpeechCapability, Utterance,
    UtteranceToken, VoiceDescriptor,
};

use super::HOST_EVENT_CAPACITY;

/// Simulated host with a single active-utterance slot
pub struct SimulatedSpeech {
    voices: Vec<VoiceDescriptor>,
    ms_per_word: u64,
    events: broadcast::Sender<HostEvent>,
    paused: watch::Sender<bool>,
    active: Mutex<Option<(UtteranceToken, JoinHandle<()>)>>,
}

impl SimulatedSpeech {
    pub fn new(voices: Vec<VoiceDescriptor>, ms_per_word: u64) -> Self {
        let (events, _) = broadcast::channel(HOST_EVENT_CAPACITY);
        let (paused, _) = watch::channel(false);
        Self {
            voices,
            ms_per_word,
            events,
            paused,
            active: Mutex::new(None),
        }
    }

    /// Build the voice list from configuration
    pub fn from_config(voices: &[SimulatedVoice], ms_per_word: u64) -> Self {
        let voices = voices
            .iter()
            .map(|voice| VoiceDescriptor::new(&voice.id, &voice.name, &voice.language))
            .collect();
        Self::new(voices, ms_per_word)
    }

    fn word_delay(&self, rate: f32) -> Duration {
        let rate = if rate > 0.0 { rate } else { 1.0 };
        Duration::from_millis((self.ms_per_word as f32 / rate).round() as u64)
    }

    fn interrupt_active(&self, kind: HostErrorKind) {
        if let Some((token, handle)) = self.active.lock().take() {
            if !handle.is_finished() {
                handle.abort();
                let _ = self.events.send(HostEvent::Error { token, kind });
            }
        }
    }
}

/// Character offsets where words begin
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_word = false;
    for (offset, c) in text.chars().enumerate() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            starts.push(offset);
            in_word = true;
        }
    }
    starts
}

async fn wait_while_paused(paused: &mut watch::Receiver<bool>) -> bool {
    while *paused.borrow_and_update() {
        if paused.changed().await.is_err() {
            return false;
        }
    }
    true
}

impl SpeechCapability for SimulatedSpeech {
    fn is_available(&self) -> bool {
        tokio::runtime::Handle::try_current().is_ok()
    }

    fn voices(&self) -> Vec<VoiceDescriptor> {
        self.voices.clone()
    }

    fn enqueue(&self, utterance: Utterance) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::HostUnavailable)?;

        self.interrupt_active(HostErrorKind::Interrupted);

        let token = utterance.token;
        let delay = self.word_delay(utterance.rate);
        let boundaries = word_starts(&utterance.text);
        let events = self.events.clone();
        let mut paused = self.paused.subscribe();

        let handle = runtime.spawn(async move {
            let _ = events.send(HostEvent::Started { token });

            for char_index in boundaries {
                if !wait_while_paused(&mut paused).await {
                    return;
                }
                let _ = events.send(HostEvent::Boundary {
                    token,
                    char_index,
                    kind: BoundaryKind::Word,
                });
                tokio::time::sleep(delay).await;
            }

            if wait_while_paused(&mut paused).await {
                let _ = events.send(HostEvent::Ended { token });
            }
        });

        *self.active.lock() = Some((token, handle));
        Ok(())
    }

    fn pause(&self) {
        self.paused.send_replace(true);
    }

    fn resume(&self) {
        self.paused.send_replace(false);
    }

    fn cancel_all(&self) {
        self.interrupt_active(HostErrorKind::Canceled);
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance(text: &str, rate: f32) -> Utterance {
        Utterance {
            token: UtteranceToken {
                generation: 1,
                index: 0,
            },
            text: text.to_string(),
            rate,
            volume: 1.0,
            voice_id: None,
        }
    }

    #[test]
    fn test_word_starts() {
        assert_eq!(word_starts("Hola  mundo."), vec![0, 6]);
        assert_eq!(word_starts("¿Qué tal?"), vec![0, 5]);
        assert!(word_starts("   ").is_empty());
    }

    #[test]
    fn test_word_delay_scales_with_rate() {
        let host = SimulatedSpeech::new(Vec::new(), 400);
        assert_eq!(host.word_delay(1.0), Duration::from_millis(400));
        assert_eq!(host.word_delay(2.0), Duration::from_millis(200));
        assert_eq!(host.word_delay(0.0), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speaks_and_ends() {
        let host = SimulatedSpeech::new(Vec::new(), 100);
        let mut rx = host.subscribe();
        host.enqueue(utterance("uno dos", 1.0)).unwrap();

        let mut boundaries = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                HostEvent::Boundary { char_index, .. } => boundaries.push(char_index),
                HostEvent::Ended { .. } => break,
                _ => {}
            }
        }
        assert_eq!(boundaries, vec![0, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts() {
        let host = SimulatedSpeech::new(Vec::new(), 1_000);
        let mut rx = host.subscribe();
        host.enqueue(utterance("una frase bastante larga", 1.0)).unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        host.cancel_all();

        let mut saw_cancel = false;
        while let Ok(event) = rx.try_recv() {
            if let HostEvent::Error { kind, .. } = event {
                assert_eq!(kind, HostErrorKind::Canceled);
                saw_cancel = true;
            }
        }
        assert!(saw_cancel);
    }

    #[test]
    fn test_unavailable_without_runtime() {
        let host = SimulatedSpeech::new(Vec::new(), 100);
        assert!(!host.is_available());
        assert_eq!(
            host.enqueue(utterance("hola", 1.0)),
            Err(Error::HostUnavailable)
        );
    }
}
