//! Snapshot dumps for debugging.
//!
//! After a refresh the engine can write the whole cache to disk so an
//! operator can see exactly what the process was running with. Dumps are
//! best effort: failures are logged by the caller and never fail a sync.

use crate::error::SyncResult;
use apollo_sync_protocol::Configurations;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Name used for dumps written by the cached-fetch path.
pub const CACHED_SNAPSHOT_NAME: &str = "cached_config";

/// Receives cache snapshots.
pub trait SnapshotSink: Send + Sync {
    /// Writes a snapshot of every namespace under `name`.
    fn write_snapshot(
        &self,
        name: &str,
        snapshot: &BTreeMap<String, Configurations>,
    ) -> SyncResult<()>;
}

/// Writes snapshots as pretty JSON files into a directory.
///
/// The file is named after the release key, so consecutive releases leave a
/// trail of files.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Creates a sink writing into `dir`. The directory is created on demand.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(name: &str) -> String {
        name.chars()
            .map(|c| match c {
                '/' | '\\' | '\0' => '_',
                c => c,
            })
            .collect()
    }
}

impl SnapshotSink for DirectorySink {
    fn write_snapshot(
        &self,
        name: &str,
        snapshot: &BTreeMap<String, Configurations>,
    ) -> SyncResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::file_name(name));
        let body = serde_json::to_vec_pretty(snapshot).map_err(std::io::Error::from)?;
        fs::write(&path, body)?;
        tracing::debug!(path = %path.display(), "wrote config snapshot");
        Ok(())
    }
}
