//! File-backed storage snapshot.
//!
//! The snapshot is the sole shared mutable resource: it is read in full,
//! mutated in memory, and written in full. Concurrent ingests are
//! serialized by an async mutex held for the whole load-mutate-write
//! cycle; queries load without the exclusive lock and may observe either
//! the pre- or post-ingest state, never a partially written one.

use std::path::PathBuf;

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{RagError, Result};
use crate::models::StorageSnapshot;

/// JSON-file snapshot store.
pub struct SnapshotStore {
    path: PathBuf,
    ingest_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ingest_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Acquire exclusive access for one ingest's load-mutate-write cycle.
    /// The guard releases on every exit path, including errors.
    pub async fn lock_for_ingest(&self) -> MutexGuard<'_, ()> {
        self.ingest_lock.lock().await
    }

    /// Read the full snapshot. A missing file is an empty store; an
    /// unreadable or structurally invalid file is fatal corruption.
    pub fn load(&self) -> Result<StorageSnapshot> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StorageSnapshot::default());
            }
            Err(e) => {
                return Err(RagError::StorageCorruption(format!(
                    "cannot read snapshot {}: {e}",
                    self.path.display()
                )));
            }
        };

        let snapshot: StorageSnapshot = serde_json::from_str(&raw).map_err(|e| {
            RagError::StorageCorruption(format!(
                "cannot parse snapshot {}: {e}",
                self.path.display()
            ))
        })?;

        validate_snapshot(&snapshot)?;
        Ok(snapshot)
    }

    /// Write the full snapshot, creating parent directories as needed.
    ///
    /// The snapshot is written to a sibling temp file and renamed into
    /// place. Lock-free readers see either the previous or the new file,
    /// never a torn one.
    pub fn save(&self, snapshot: &StorageSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(
            path = %self.path.display(),
            docs = snapshot.documents.len(),
            chunks = snapshot.chunks.len(),
            "snapshot saved"
        );
        Ok(())
    }
}

/// Referential integrity check: every page belongs to a known document and
/// every chunk to a known page. Violations mean the snapshot was not
/// produced by this pipeline and cannot be trusted.
fn validate_snapshot(snapshot: &StorageSnapshot) -> Result<()> {
    for page in snapshot.pages.values() {
        if !snapshot.documents.contains_key(&page.doc_id) {
            return Err(RagError::StorageCorruption(format!(
                "page {} references unknown document {}",
                page.page_id, page.doc_id
            )));
        }
    }
    for chunk in snapshot.chunks.values() {
        if !snapshot.pages.contains_key(&chunk.page_id) {
            return Err(RagError::StorageCorruption(format!(
                "chunk {} references unknown page {}",
                chunk.chunk_id, chunk.page_id
            )));
        }
    }
    Ok(())
}
