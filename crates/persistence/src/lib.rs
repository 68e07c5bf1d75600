//! Local persistence for the reader
//!
//! Provides the storage ports used by playback:
//! - Key-value store for small client preferences (selected voice)
//! - Per-book reading progress
//!
//! Each port has an in-memory implementation for tests and single-run use,
//! and a JSON-file implementation for the command-line player.

pub mod error;
pub mod kv;
pub mod progress;

pub use error::PersistenceError;
pub use kv::{FileKeyValueStore, InMemoryKeyValueStore};
pub use progress::{FileProgressStore, InMemoryProgressStore};
