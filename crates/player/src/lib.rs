//! Reader-facing playback
//!
//! - `ReaderSession`: one open book, transport controls and the player view
//! - `ProgressSynchronizer`: debounced progress writes and resume position
//! - Word highlighting for the text view

pub mod highlight;
pub mod progress_sync;
pub mod session;

pub use highlight::word_range;
pub use progress_sync::{ProgressSynchronizer, Reconciliation};
pub use session::{PlayerView, ReaderSession, SessionConfig};
