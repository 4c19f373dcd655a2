//! Snapshot persisters
//!
//! A persister is the opaque sink the journal checkpoints into. The journal
//! never retries a persister call; durability policy and retry belong to the
//! persister itself.

use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tidemark_core::{Snapshot, SNAPSHOT_VERSION};

/// Errors raised by persisters.
#[derive(Debug, Error)]
pub enum PersistError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot failed to serialize.
    #[error("snapshot encode error: {0}")]
    Encode(String),

    /// Snapshot file failed to deserialize.
    #[error("snapshot decode error: {0}")]
    Decode(String),

    /// Snapshot file was written by a newer format version.
    #[error("unsupported snapshot version {found} (supported: {SNAPSHOT_VERSION})")]
    UnsupportedVersion {
        /// Version found in the file's manifest.
        found: u32,
    },

    /// The sink rejected the snapshot.
    #[error("snapshot rejected: {0}")]
    Rejected(String),
}

/// A sink that durably stores snapshots. Blocking I/O is permitted; calls
/// arrive in checkpoint order.
pub trait SnapshotPersister: Send + Sync {
    /// Store one snapshot.
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError>;
}

/// A persister that records every saved snapshot in memory.
///
/// Used by tests and by embedders that checkpoint through their own channel.
#[derive(Default)]
pub struct MemoryPersister {
    saved: Mutex<Vec<Snapshot>>,
}

impl MemoryPersister {
    /// Create an empty persister.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots saved so far.
    pub fn save_count(&self) -> usize {
        self.saved.lock().len()
    }

    /// The most recently saved snapshot.
    pub fn last(&self) -> Option<Snapshot> {
        self.saved.lock().last().cloned()
    }

    /// All saved snapshots, in save order.
    pub fn saved(&self) -> Vec<Snapshot> {
        self.saved.lock().clone()
    }
}

impl SnapshotPersister for MemoryPersister {
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        self.saved.lock().push(snapshot.clone());
        Ok(())
    }
}

/// A persister that writes MessagePack snapshot files crash-safely.
///
/// Each save serializes to a sibling temp file, fsyncs it, and renames it
/// over the target path, so a crash mid-write never leaves a torn snapshot.
pub struct FileSnapshotPersister {
    path: PathBuf,
}

impl FileSnapshotPersister {
    /// Persist snapshots to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSnapshotPersister { path: path.into() }
    }

    /// The target path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a snapshot file written by this persister.
    pub fn load(path: &Path) -> Result<Snapshot, PersistError> {
        let bytes = fs::read(path)?;
        let snapshot: Snapshot =
            rmp_serde::from_slice(&bytes).map_err(|e| PersistError::Decode(e.to_string()))?;
        if let Some(manifest) = &snapshot.manifest {
            if manifest.version > SNAPSHOT_VERSION {
                return Err(PersistError::UnsupportedVersion {
                    found: manifest.version,
                });
            }
        }
        Ok(snapshot)
    }
}

impl SnapshotPersister for FileSnapshotPersister {
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        let bytes =
            rmp_serde::to_vec(snapshot).map_err(|e| PersistError::Encode(e.to_string()))?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            resources = snapshot.resources.len(),
            "snapshot persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidemark_core::{ResourceState, Urn};

    fn snap(names: &[&str]) -> Snapshot {
        Snapshot::from_resources(
            names
                .iter()
                .map(|n| Arc::new(ResourceState::new(Urn::new("s", "p", "t", n))))
                .collect(),
        )
    }

    #[test]
    fn test_memory_persister_records_in_order() {
        let persister = MemoryPersister::new();
        persister.save(&snap(&["a"])).unwrap();
        persister.save(&snap(&["a", "b"])).unwrap();

        assert_eq!(persister.save_count(), 2);
        assert_eq!(persister.saved()[0].len(), 1);
        assert_eq!(persister.last().unwrap().len(), 2);
    }

    #[test]
    fn test_file_persister_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.tmk");
        let persister = FileSnapshotPersister::new(&path);

        let snapshot = snap(&["a", "b"]);
        persister.save(&snapshot).unwrap();

        let loaded = FileSnapshotPersister::load(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_file_persister_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.tmk");
        let persister = FileSnapshotPersister::new(&path);

        persister.save(&snap(&["a"])).unwrap();
        persister.save(&snap(&["a", "b", "c"])).unwrap();

        let loaded = FileSnapshotPersister::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        // No temp file left behind
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_rejects_newer_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.tmk");

        let mut snapshot = snap(&["a"]);
        snapshot.manifest.as_mut().unwrap().version = SNAPSHOT_VERSION + 1;
        FileSnapshotPersister::new(&path).save(&snapshot).unwrap();

        assert!(matches!(
            FileSnapshotPersister::load(&path),
            Err(PersistError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.tmk");
        std::fs::write(&path, b"not a snapshot").unwrap();
        assert!(matches!(
            FileSnapshotPersister::load(&path),
            Err(PersistError::Decode(_))
        ));
    }
}
