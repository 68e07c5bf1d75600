//! Voz Libro command-line player
//!
//! Usage: `voz-libro <text-file> [book-id]`
//!
//! Reads a plain-text book aloud through the simulated speech host, resuming
//! from the stored position and saving progress as it goes.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voz_libro_config::{constants, load_settings, Settings};
use voz_libro_core::{estimate_duration, Book};
use voz_libro_persistence::{FileKeyValueStore, FileProgressStore};
use voz_libro_pipeline::{PlaybackEvent, SimulatedSpeech};
use voz_libro_player::{ReaderSession, SessionConfig};

const USAGE: &str = "usage: voz-libro <text-file> [book-id]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("VOZ_LIBRO_ENV").ok();
    let settings = load_settings(env.as_deref()).context("Failed to load configuration")?;

    init_tracing(&settings);
    tracing::info!("Starting Voz Libro v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let path = args.next().context(USAGE)?;
    let stem = Path::new(&path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "libro".to_string());
    let book_id = args.next().unwrap_or_else(|| stem.clone());

    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {path}"))?;
    tracing::info!(book_id = %book_id, duration = %estimate_duration(&text), "Loaded book");

    let host = Arc::new(SimulatedSpeech::from_config(
        &settings.voices.simulated,
        constants::simulation::MS_PER_WORD,
    ));
    let kv = Arc::new(FileKeyValueStore::open(&settings.storage.key_value_path));
    let progress = Arc::new(FileProgressStore::new(&settings.storage.progress_path));

    let session = ReaderSession::new(host, kv, progress, SessionConfig::from(&settings));
    session.spawn_drivers();

    if let Some(voice) = session.registry().selected() {
        tracing::info!(voice = %voice.display_label(), "Using voice");
    }

    let mut events = session.subscribe();
    let outcome = session.open(Book::new(book_id, stem, text)).await?;
    tracing::info!(?outcome, segments = session.engine().total_segments(), "Playback started");

    let segments = session.engine().segments();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(PlaybackEvent::SegmentStarted { index }) => {
                    if let Some(segment) = segments.get(index) {
                        println!("[{}/{}] {}", index + 1, segments.len(), segment.text);
                    }
                }
                Ok(PlaybackEvent::Ended) => {
                    tracing::info!("Finished reading");
                    break;
                }
                Ok(PlaybackEvent::Error(err)) => {
                    tracing::error!(error = %err, "Playback stopped");
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event output lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = shutdown_signal() => {
                if let Some(sync) = session.synchronizer() {
                    // failures are already logged
                    let _ = sync.flush().await;
                }
                break;
            }
        }
    }

    session.close();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, stopping playback..."),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("voz_libro={level}").into()
    });

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
