//! In-memory reference store, primarily for tests and small corpora.

use std::collections::BTreeSet;

use ahash::AHashSet;
use attest_model::{RawRecord, RecordId, ShallowHash};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::state::CorpusState;
use crate::{
    CanonicalRecord, CorpusStore, EvidenceLink, HashFilter, RawSource, RefinementLink, RunMarker,
    StoreResult,
};

/// Process-memory store implementing both [`RawSource`] and [`CorpusStore`].
///
/// Each insert takes the write lock once for its whole batch, so readers
/// only ever observe whole-batch-committed state.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<CorpusState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest raw records. Duplicate ids are ignored.
    pub fn insert_raw_records(&self, records: Vec<RawRecord>) -> StoreResult<usize> {
        let mut state = self.state.write();
        let mut added = 0;
        for record in records {
            if state.apply_raw(record) {
                added += 1;
            }
        }
        Ok(added)
    }
}

impl RawSource for MemoryStore {
    fn all_ids(&self) -> StoreResult<BTreeSet<RecordId>> {
        Ok(self.state.read().all_raw_ids())
    }

    fn unlinked_ids(&self) -> StoreResult<BTreeSet<RecordId>> {
        Ok(self.state.read().unlinked_raw_ids())
    }

    fn fetch_records(&self, ids: &BTreeSet<RecordId>) -> StoreResult<Vec<RawRecord>> {
        Ok(self.state.read().fetch_raws(ids))
    }
}

impl CorpusStore for MemoryStore {
    fn insert_canonical_records(&self, records: &[CanonicalRecord]) -> StoreResult<()> {
        let mut state = self.state.write();
        state.check_canonical_batch(records)?;
        for record in records {
            state.apply_canonical(record.clone());
        }
        Ok(())
    }

    fn insert_evidence_links(&self, links: &[EvidenceLink]) -> StoreResult<()> {
        let mut state = self.state.write();
        state.check_evidence_batch(links)?;
        for link in links {
            state.apply_evidence(*link);
        }
        Ok(())
    }

    fn insert_refinement_links(&self, links: &[RefinementLink]) -> StoreResult<()> {
        let mut state = self.state.write();
        state.check_refinement_batch(links)?;
        for link in links {
            state.apply_refinement(*link);
        }
        Ok(())
    }

    fn known_hashes(&self) -> StoreResult<AHashSet<ShallowHash>> {
        Ok(self.state.read().known_hashes())
    }

    fn existing_refinement_links(&self) -> StoreResult<AHashSet<RefinementLink>> {
        Ok(self.state.read().refinement_links())
    }

    fn linked_record_ids(&self) -> StoreResult<BTreeSet<RecordId>> {
        Ok(self.state.read().linked_record_ids())
    }

    fn fetch_canonical(
        &self,
        filter: &HashFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<CanonicalRecord>> {
        Ok(self.state.read().fetch_canonical(filter, offset, limit))
    }

    fn add_run_marker(&self, marker: RunMarker) -> StoreResult<()> {
        self.state.write().apply_run_marker(marker);
        Ok(())
    }

    fn latest_update_time(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.state.read().latest_update_time())
    }

    fn canonical_record(&self, hash: ShallowHash) -> StoreResult<Option<CanonicalRecord>> {
        Ok(self.state.read().canonical_record(hash))
    }

    fn evidence_for(&self, hash: ShallowHash) -> StoreResult<Vec<RecordId>> {
        Ok(self.state.read().evidence_for(hash))
    }

    fn links_touching(&self, hash: ShallowHash) -> StoreResult<Vec<RefinementLink>> {
        Ok(self.state.read().links_touching(hash))
    }
}
