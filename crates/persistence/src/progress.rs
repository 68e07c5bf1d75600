//! Reading-progress stores

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use voz_libro_core::{Error, ProgressRecord, ProgressStore, Result};

use crate::PersistenceError;

/// Process-local progress store that records every write
#[derive(Default)]
pub struct InMemoryProgressStore {
    records: RwLock<BTreeMap<String, ProgressRecord>>,
    writes: Mutex<Vec<ProgressRecord>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored record without counting it as a write
    pub fn insert(&self, record: ProgressRecord) {
        self.records.write().insert(record.book_id.clone(), record);
    }

    pub fn get(&self, book_id: &str) -> Option<ProgressRecord> {
        self.records.read().get(book_id).cloned()
    }

    /// Every successful write, in order
    pub fn writes(&self) -> Vec<ProgressRecord> {
        self.writes.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn fetch(&self, book_id: &str) -> Result<Option<ProgressRecord>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistenceError::Injected(format!("read of {book_id} rejected")).into());
        }
        Ok(self.get(book_id))
    }

    async fn update_progress(
        &self,
        book_id: &str,
        last_position: usize,
        progress_percent: u8,
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::PersistenceWrite(format!(
                "write of {book_id} rejected"
            )));
        }

        let record = ProgressRecord {
            book_id: book_id.to_string(),
            last_position,
            progress_percent: progress_percent.min(100),
        };
        self.records.write().insert(book_id.to_string(), record.clone());
        self.writes.lock().push(record);
        Ok(())
    }
}

/// Progress store backed by a JSON file keyed by book id
pub struct FileProgressStore {
    path: PathBuf,
    // serializes read-modify-write cycles
    lock: tokio::sync::Mutex<()>,
}

impl FileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> std::result::Result<BTreeMap<String, ProgressRecord>, PersistenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn store(
        &self,
        records: &BTreeMap<String, ProgressRecord>,
    ) -> std::result::Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn upsert(&self, record: ProgressRecord) -> std::result::Result<(), PersistenceError> {
        let mut records = self.load().await?;
        records.insert(record.book_id.clone(), record);
        self.store(&records).await
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn fetch(&self, book_id: &str) -> Result<Option<ProgressRecord>> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        Ok(records.remove(book_id))
    }

    async fn update_progress(
        &self,
        book_id: &str,
        last_position: usize,
        progress_percent: u8,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;

        let record = ProgressRecord {
            book_id: book_id.to_string(),
            last_position,
            progress_percent: progress_percent.min(100),
        };
        self.upsert(record)
            .await
            .map_err(|err| Error::PersistenceWrite(err.to_string()))?;

        tracing::debug!(book_id, last_position, progress_percent, "Progress saved");
        Ok(())
    }
}
