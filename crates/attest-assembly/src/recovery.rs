//! Per-phase checkpoint state.
//!
//! Each phase persists the minimum it needs to pick up where it left off,
//! as a versioned bincode blob in the [`CheckpointStore`]. Blobs are
//! written at phase/batch boundaries only, after the corresponding store
//! writes have landed, so a checkpoint never claims work the store does
//! not have.

use std::collections::BTreeSet;

use attest_model::{RecordId, ShallowHash};
use attest_store::{CheckpointStore, RefinementLink};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AssemblyError;

pub const PHASE_IDS: &str = "ids";
pub const PHASE_DEDUP: &str = "dedup";
pub const PHASE_SCAN: &str = "scan";

const CHECKPOINT_VERSION: u16 = 1;

/// Raw ids collected for this run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdsCheckpoint {
    pub ids: BTreeSet<RecordId>,
}

/// Dedup progress: which raw ids are done, which hashes this run created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupCheckpoint {
    pub processed: BTreeSet<RecordId>,
    pub created: Vec<ShallowHash>,
}

/// Scan progress: fully completed outer batches plus the unflushed buffer.
///
/// Outer batch counting only makes sense under the batch size it was
/// written with, so that is recorded and checked on resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    pub batch_size: usize,
    pub completed_outer: usize,
    pub pending: Vec<RefinementLink>,
}

pub fn save<T: Serialize>(
    store: &dyn CheckpointStore,
    run: &str,
    phase: &str,
    state: &T,
) -> Result<(), AssemblyError> {
    let bytes = bincode::serialize(&(CHECKPOINT_VERSION, state))
        .map_err(|err| AssemblyError::Checkpoint(err.to_string()))?;
    store.save(run, phase, &bytes)?;
    Ok(())
}

pub fn load<T: DeserializeOwned>(
    store: &dyn CheckpointStore,
    run: &str,
    phase: &str,
) -> Result<Option<T>, AssemblyError> {
    let Some(bytes) = store.load(run, phase)? else {
        return Ok(None);
    };
    let (version, state): (u16, T) = bincode::deserialize(&bytes)
        .map_err(|err| AssemblyError::Checkpoint(err.to_string()))?;
    if version != CHECKPOINT_VERSION {
        return Err(AssemblyError::Checkpoint(format!(
            "unsupported checkpoint version {version}"
        )));
    }
    Ok(Some(state))
}
