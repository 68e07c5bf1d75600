//! Error types shared by every crate in the workspace

use crate::types::PlaybackStatus;
use thiserror::Error;

/// Result alias using the workspace error
pub type Result<T> = std::result::Result<T, Error>;

/// Playback errors
///
/// Transient interruptions caused by the engine's own cancel/restart calls are
/// not represented here: they are classified by [`HostErrorKind::is_transient`]
/// and absorbed before they can become an `Error`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("no speakable content")]
    EmptyContent,

    #[error("speech synthesis is not available on this runtime")]
    HostUnavailable,

    #[error("speech synthesis failed: {0}")]
    HostSynthesis(String),

    #[error("progress write failed: {0}")]
    PersistenceWrite(String),

    #[error("storage read failed: {0}")]
    Storage(String),

    #[error("cannot {operation} while {status:?}")]
    InvalidTransition {
        operation: &'static str,
        status: PlaybackStatus,
    },

    #[error("voice not found: {0}")]
    VoiceNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Error kinds reported by the host synthesis engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostErrorKind {
    /// Utterance was interrupted by a newer request
    Interrupted,
    /// Utterance was removed from the host queue by `cancel_all`
    Canceled,
    /// Anything else the host reports
    Synthesis(String),
}

impl HostErrorKind {
    /// Interruptions are expected side effects of skip/seek/parameter changes
    pub fn is_transient(&self) -> bool {
        matches!(self, HostErrorKind::Interrupted | HostErrorKind::Canceled)
    }
}

impl From<HostErrorKind> for Error {
    fn from(kind: HostErrorKind) -> Self {
        match kind {
            HostErrorKind::Interrupted => Error::HostSynthesis("interrupted".to_string()),
            HostErrorKind::Canceled => Error::HostSynthesis("canceled".to_string()),
            HostErrorKind::Synthesis(message) => Error::HostSynthesis(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(HostErrorKind::Interrupted.is_transient());
        assert!(HostErrorKind::Canceled.is_transient());
        assert!(!HostErrorKind::Synthesis("audio-busy".into()).is_transient());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::InvalidTransition {
            operation: "pause",
            status: PlaybackStatus::Idle,
        };
        assert_eq!(err.to_string(), "cannot pause while Idle");
    }
}
