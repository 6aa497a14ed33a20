//! Flat-file persistence for the in-memory adapter.
//!
//! A snapshot is a headerless two-column CSV file holding one
//! `(id, original_url)` pair per line. It is read once when the repository is
//! opened and written back when the repository is closed or checkpointed.

use crate::memory::InMemoryRepository;
use async_trait::async_trait;
use burrow_core::{LinkRecord, ReadRepository, Repository, Result, StorageError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Reads the pairs stored at `path`.
///
/// A missing, unreadable or malformed file yields an empty snapshot. Loading
/// happens before the store serves traffic, so there is nobody to report to.
pub fn load(path: &Path) -> Vec<(String, String)> {
    if !path.exists() {
        info!(path = %path.display(), "no snapshot file, starting empty");
        return Vec::new();
    }

    match read_pairs(path) {
        Ok(pairs) => {
            info!(path = %path.display(), links = pairs.len(), "loaded snapshot");
            pairs
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable snapshot, starting empty");
            Vec::new()
        }
    }
}

fn read_pairs(path: &Path) -> Result<Vec<(String, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    let mut pairs = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(csv_error)?;
        match (row.len(), row.get(0), row.get(1)) {
            (2, Some(id), Some(url)) if !id.is_empty() && !url.is_empty() => {
                pairs.push((id.to_owned(), url.to_owned()));
            }
            _ => {
                return Err(StorageError::InvalidData(format!(
                    "line {}: expected two non-empty columns, got {:?}",
                    line + 1,
                    row
                )));
            }
        }
    }

    Ok(pairs)
}

/// Writes `pairs` to `path`, replacing whatever the file held before.
pub fn flush(path: &Path, pairs: &[(String, String)]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_error)?;

    for (id, url) in pairs {
        writer.write_record([id, url]).map_err(csv_error)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), links = pairs.len(), "flushed snapshot");
    Ok(())
}

fn csv_error(err: csv::Error) -> StorageError {
    StorageError::Io(err.to_string())
}

/// In-memory repository persisted to a snapshot file.
///
/// At runtime it behaves exactly like [`InMemoryRepository`], including the
/// best-effort batch semantics. Links loaded from the snapshot belong to
/// [`burrow_core::ANONYMOUS_USER`] since the file does not record owners.
/// Soft-deleted links are not written back.
#[derive(Debug)]
pub struct SnapshotRepository {
    inner: InMemoryRepository,
    path: PathBuf,
}

impl SnapshotRepository {
    /// Opens the snapshot at `path`, starting empty if it cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = load(&path)
            .into_iter()
            .map(|(id, url)| LinkRecord::anonymous(id, url));

        Self {
            inner: InMemoryRepository::from_records(records),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the wrapped in-memory repository.
    pub fn inner(&self) -> &InMemoryRepository {
        &self.inner
    }

    /// Writes the current live links to the snapshot file.
    pub async fn checkpoint(&self) -> Result<()> {
        let pairs = self.inner.live_pairs();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || flush(&path, &pairs))
            .await
            .map_err(|e| StorageError::Io(format!("snapshot flush task failed: {e}")))?
    }
}

#[async_trait]
impl ReadRepository for SnapshotRepository {
    async fn get_by_id(&self, id: &str) -> Result<String> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<String> {
        self.inner.get_by_original_url(original_url).await
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<LinkRecord>> {
        self.inner.list_by_user(user_id).await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}

#[async_trait]
impl Repository for SnapshotRepository {
    async fn add(&self, record: LinkRecord) -> Result<()> {
        self.inner.add(record).await
    }

    async fn add_batch(&self, records: Vec<LinkRecord>) -> Result<()> {
        self.inner.add_batch(records).await
    }

    async fn delete_batch(&self, ids: Vec<String>, user_id: &str) -> Result<()> {
        self.inner.delete_batch(ids, user_id).await
    }

    /// Flushes the snapshot, then closes the in-memory store.
    ///
    /// A failed flush is logged and otherwise ignored.
    async fn close(&self) -> Result<()> {
        if let Err(err) = self.checkpoint().await {
            warn!(path = %self.path.display(), error = %err, "failed to flush snapshot on shutdown");
        }
        self.inner.close().await
    }
}
