//! Pre-write snapshots and content hashing.

use crate::ProposerError;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// SHA-256 of artifact content, hex-encoded. Used both for concurrency
/// checks on patches and for revert verification.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone, Debug)]
pub struct Snapshot {
    pub path: String,
    pub content: String,
    pub hash: String,
    pub taken_at: DateTime<Utc>,
}

/// Keeps the latest pre-write snapshot per artifact, in memory and as a
/// file copy for operator forensics.
pub struct SnapshotStore {
    dir: PathBuf,
    latest: Mutex<HashMap<String, Snapshot>>,
}

impl SnapshotStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            latest: Mutex::new(HashMap::new()),
        }
    }

    /// Capture the current content of `path` before a write.
    pub async fn capture(&self, path: &str, content: &str) -> Result<Snapshot, ProposerError> {
        let snapshot = Snapshot {
            path: path.to_string(),
            content: content.to_string(),
            hash: content_hash(content),
            taken_at: Utc::now(),
        };

        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = format!("{}.snap", snapshot.hash);
        tokio::fs::write(self.dir.join(file_name), content).await?;

        self.latest
            .lock()
            .expect("snapshot store poisoned")
            .insert(path.to_string(), snapshot.clone());
        Ok(snapshot)
    }

    pub fn latest_for(&self, path: &str) -> Option<Snapshot> {
        self.latest
            .lock()
            .expect("snapshot store poisoned")
            .get(path)
            .cloned()
    }

    /// Restore the latest snapshot of `path` onto disk and return it.
    pub async fn restore(&self, path: &str) -> Result<Snapshot, ProposerError> {
        let snapshot = self
            .latest_for(path)
            .ok_or_else(|| ProposerError::NoSnapshot {
                path: path.to_string(),
            })?;
        tokio::fs::write(&snapshot.path, &snapshot.content).await?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn restore_returns_byte_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("worker.py");
        let original = "x = 1\n";
        tokio::fs::write(&target, original).await.unwrap();

        let store = SnapshotStore::new(dir.path().join("snapshots"));
        let target_str = target.to_string_lossy().to_string();
        let snapshot = store.capture(&target_str, original).await.unwrap();
        assert_eq!(snapshot.hash, content_hash(original));

        tokio::fs::write(&target, "x = 2\n").await.unwrap();
        let restored = store.restore(&target_str).await.unwrap();
        assert_eq!(restored.hash, content_hash(original));

        let on_disk = tokio::fs::read_to_string(&target).await.unwrap();
        assert_eq!(on_disk, original);
    }

    #[tokio::test]
    async fn restore_without_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(matches!(
            store.restore("missing.py").await,
            Err(ProposerError::NoSnapshot { .. })
        ));
    }
}
