//! Attest Storage Layer
//!
//! Abstract interfaces over the durable corpus plus two reference
//! implementations:
//!
//! - [`RawSource`]: the queryable collection of raw records, filterable by
//!   id set and by the "not yet linked" predicate.
//! - [`CorpusStore`]: append-only batch inserts for canonical records and
//!   links, set-membership lookups, batched canonical iteration, run
//!   markers, and the read-only query surface.
//! - [`CheckpointStore`]: an atomic blob store for per-phase recovery
//!   state, keyed by run id and phase name.
//!
//! [`MemoryStore`] keeps everything in process memory; [`FileStore`] is an
//! embedded append-only log with replay-on-open. Both expose whole batches
//! only: an insert call either lands completely or not at all as far as
//! readers are concerned.

pub mod checkpoint;
pub mod memory;
pub mod persistence;

mod state;


use std::collections::BTreeSet;

use ahash::AHashSet;
use attest_model::{AssertionContent, RawRecord, RecordId, ShallowHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use checkpoint::{CheckpointStore, FsCheckpointStore, MemoryCheckpointStore};
pub use memory::MemoryStore;
pub use persistence::FileStore;

// ============================================================================
// Persisted relations
// ============================================================================

/// One deduplicated assertion, identified by its content-only hash.
///
/// Created once per distinct hash, never mutated thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub hash: ShallowHash,
    pub content: AssertionContent,
}

impl CanonicalRecord {
    /// Build the canonical record for normalized content.
    pub fn from_content(content: AssertionContent) -> Self {
        Self {
            hash: content.shallow_hash(),
            content,
        }
    }
}

/// Association between a canonical record and one raw record that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceLink {
    pub canonical: ShallowHash,
    pub record: RecordId,
}

/// Directed refinement edge: `specific` is a more detailed instance of
/// `general`. Never reflexive, never present in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefinementLink {
    pub general: ShallowHash,
    pub specific: ShallowHash,
}

impl RefinementLink {
    pub fn new(general: ShallowHash, specific: ShallowHash) -> Self {
        Self { general, specific }
    }

    /// The same edge with its direction reversed.
    pub fn mirror(&self) -> Self {
        Self {
            general: self.specific,
            specific: self.general,
        }
    }

    pub fn is_reflexive(&self) -> bool {
        self.general == self.specific
    }
}

/// Record of one completed assembly run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMarker {
    pub run_at: DateTime<Utc>,
    /// True for the run that initialized the corpus.
    pub corpus_init: bool,
}

// ============================================================================
// Hash filters for batched iteration
// ============================================================================

/// Restricts which canonical records a batched fetch returns.
///
/// `include: None` admits every hash; `exclude` is applied afterwards.
#[derive(Debug, Clone, Default)]
pub struct HashFilter {
    pub include: Option<AHashSet<ShallowHash>>,
    pub exclude: Option<AHashSet<ShallowHash>>,
}

impl HashFilter {
    /// Admit the whole corpus.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn include(hashes: AHashSet<ShallowHash>) -> Self {
        Self {
            include: Some(hashes),
            exclude: None,
        }
    }

    pub fn exclude(hashes: AHashSet<ShallowHash>) -> Self {
        Self {
            include: None,
            exclude: Some(hashes),
        }
    }

    pub fn admits(&self, hash: ShallowHash) -> bool {
        if let Some(include) = &self.include {
            if !include.contains(&hash) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.contains(&hash) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Errors
// ============================================================================

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt stored data: {0}")]
    Codec(String),

    /// A write that would corrupt the corpus: a second canonical record for
    /// one hash, a raw record linked to two canonical records, or a
    /// reflexive/symmetric refinement link. Never retried.
    #[error("internal consistency violation: {0}")]
    Consistency(String),
}

impl StoreError {
    pub(crate) fn codec(err: bincode::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

// ============================================================================
// Interfaces
// ============================================================================

/// The queryable collection of raw records.
pub trait RawSource: Send + Sync {
    /// All raw record ids currently in the source.
    fn all_ids(&self) -> StoreResult<BTreeSet<RecordId>>;

    /// Ids of raw records not yet linked to any canonical record.
    fn unlinked_ids(&self) -> StoreResult<BTreeSet<RecordId>>;

    /// Fetch the records for an id set. Missing ids are skipped, not errors;
    /// records may have been distilled away between id collection and fetch.
    fn fetch_records(&self, ids: &BTreeSet<RecordId>) -> StoreResult<Vec<RawRecord>>;
}

/// The durable corpus of canonical records and links.
///
/// All inserts are append-only and batch-atomic with respect to readers.
pub trait CorpusStore: Send + Sync {
    /// Insert new canonical records. A hash that already exists is a fatal
    /// consistency error: the deduplicator must never produce one.
    fn insert_canonical_records(&self, records: &[CanonicalRecord]) -> StoreResult<()>;

    /// Insert evidence links. Exact duplicates are absorbed (set semantics,
    /// so a resumed run may safely re-send a batch); a raw record linked to
    /// a second, different hash is a fatal consistency error.
    fn insert_evidence_links(&self, links: &[EvidenceLink]) -> StoreResult<()>;

    /// Insert refinement links. Exact duplicates are absorbed; a reflexive
    /// link or one whose mirror is present is a fatal consistency error.
    fn insert_refinement_links(&self, links: &[RefinementLink]) -> StoreResult<()>;

    /// The set of canonical hashes currently in the corpus.
    fn known_hashes(&self) -> StoreResult<AHashSet<ShallowHash>>;

    /// All refinement links currently in the corpus.
    fn existing_refinement_links(&self) -> StoreResult<AHashSet<RefinementLink>>;

    /// Raw ids that already have an evidence link.
    fn linked_record_ids(&self) -> StoreResult<BTreeSet<RecordId>>;

    /// One page of canonical records admitted by `filter`, in stable hash
    /// order. `offset` counts admitted records, not stored ones, so callers
    /// can walk the filtered corpus batch by batch.
    fn fetch_canonical(
        &self,
        filter: &HashFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<CanonicalRecord>>;

    fn add_run_marker(&self, marker: RunMarker) -> StoreResult<()>;

    /// Timestamp of the most recent completed run, if any.
    fn latest_update_time(&self) -> StoreResult<Option<DateTime<Utc>>>;

    // ------------------------------------------------------------------
    // Read-only query surface
    // ------------------------------------------------------------------

    fn canonical_record(&self, hash: ShallowHash) -> StoreResult<Option<CanonicalRecord>>;

    /// Raw ids whose content collapsed into the given canonical record.
    fn evidence_for(&self, hash: ShallowHash) -> StoreResult<Vec<RecordId>>;

    /// Refinement links with the given hash on either side.
    fn links_touching(&self, hash: ShallowHash) -> StoreResult<Vec<RefinementLink>>;
}
