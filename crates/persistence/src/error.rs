//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Simulated failure: {0}")]
    Injected(String),
}

impl From<PersistenceError> for voz_libro_core::Error {
    fn from(err: PersistenceError) -> Self {
        voz_libro_core::Error::Storage(err.to_string())
    }
}
