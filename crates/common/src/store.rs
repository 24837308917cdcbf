//! On-disk snapshot of volume definitions
//!
//! The snapshot is a single JSON array with one object per volume. It only
//! ever holds static configuration; mount identifiers, reference counts and
//! process state are rebuilt from scratch on every start.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::volume::VolumeConfig;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to write snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to replace snapshot {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// JSON snapshot file holding every known volume definition
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot
    ///
    /// A missing or malformed file means no volumes are known. Both cases are
    /// logged and never fail startup.
    pub fn load(&self) -> Vec<VolumeConfig> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no volume snapshot found, starting empty");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to read volume snapshot: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<VolumeConfig>>(&data) {
            Ok(volumes) => {
                tracing::debug!(
                    path = %self.path.display(),
                    "loaded {} volume definitions",
                    volumes.len()
                );
                volumes
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "ignoring malformed volume snapshot: {}", e);
                Vec::new()
            }
        }
    }

    /// Atomically replace the snapshot with `volumes`
    ///
    /// The data is written to a temporary file next to the target, synced and
    /// renamed over it, so a crash leaves either the old or the new snapshot.
    pub fn save(&self, volumes: &[VolumeConfig]) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        fs::create_dir_all(&dir).map_err(io_err)?;
        let tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;

        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, volumes)?;
            writer.write_all(b"\n").map_err(io_err)?;
            writer.flush().map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;

        tmp.persist(&self.path)
            .map_err(|e| StorageError::Persist {
                path: self.path.clone(),
                source: e.error,
            })?;

        tracing::debug!(
            path = %self.path.display(),
            "persisted {} volume definitions",
            volumes.len()
        );
        Ok(())
    }
}
