//! Atomic checkpoint blob store.
//!
//! Recovery state is opaque bytes keyed by (run id, phase name). The
//! filesystem implementation writes a temp file and renames it into place,
//! so a reader never observes a partial blob; any keyed store with an
//! atomic put satisfies the same contract.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::StoreResult;

/// Durable, atomically written recovery state for pipeline phases.
///
/// Kept distinct from the main corpus store: checkpoints are scratch state
/// for one run, deleted wholesale once the run completes.
pub trait CheckpointStore: Send + Sync {
    /// Atomically persist the blob for (run, phase), replacing any prior one.
    fn save(&self, run: &str, phase: &str, bytes: &[u8]) -> StoreResult<()>;

    fn load(&self, run: &str, phase: &str) -> StoreResult<Option<Vec<u8>>>;

    fn delete(&self, run: &str, phase: &str) -> StoreResult<()>;

    /// Drop every checkpoint belonging to `run`.
    fn clear_run(&self, run: &str) -> StoreResult<()>;
}

// ============================================================================
// Filesystem implementation
// ============================================================================

/// One file per (run, phase) under a dedicated directory; writes go through
/// a `.tmp` sibling and a rename.
pub struct FsCheckpointStore {
    dir: PathBuf,
}

impl FsCheckpointStore {
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn blob_path(&self, run: &str, phase: &str) -> PathBuf {
        self.dir.join(format!("{run}.{phase}.ckpt"))
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn save(&self, run: &str, phase: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.blob_path(run, phase);
        let tmp = path.with_extension("ckpt.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, run: &str, phase: &str) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.blob_path(run, phase)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, run: &str, phase: &str) -> StoreResult<()> {
        match fs::remove_file(self.blob_path(run, phase)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn clear_run(&self, run: &str) -> StoreResult<()> {
        let prefix = format!("{run}.");
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(".ckpt") {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// In-memory implementation (tests, ephemeral runs)
// ============================================================================

#[derive(Default)]
pub struct MemoryCheckpointStore {
    blobs: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, run: &str, phase: &str, bytes: &[u8]) -> StoreResult<()> {
        self.blobs
            .write()
            .insert((run.to_string(), phase.to_string()), bytes.to_vec());
        Ok(())
    }

    fn load(&self, run: &str, phase: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .read()
            .get(&(run.to_string(), phase.to_string()))
            .cloned())
    }

    fn delete(&self, run: &str, phase: &str) -> StoreResult<()> {
        self.blobs
            .write()
            .remove(&(run.to_string(), phase.to_string()));
        Ok(())
    }

    fn clear_run(&self, run: &str) -> StoreResult<()> {
        self.blobs.write().retain(|(r, _), _| r != run);
        Ok(())
    }
}
