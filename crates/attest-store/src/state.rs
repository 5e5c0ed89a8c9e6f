//! In-memory corpus indexes shared by the reference stores.
//!
//! Both [`MemoryStore`](crate::MemoryStore) and
//! [`FileStore`](crate::FileStore) answer queries from this structure; the
//! file store additionally replays its log through it on open. All
//! consistency checks live here so every store enforces them identically.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashSet;
use attest_model::{RawRecord, RecordId, ShallowHash};
use chrono::{DateTime, Utc};

use crate::{
    CanonicalRecord, EvidenceLink, HashFilter, RefinementLink, RunMarker, StoreError, StoreResult,
};

#[derive(Default)]
pub(crate) struct CorpusState {
    raws: BTreeMap<RecordId, RawRecord>,
    // BTreeMap keeps canonical iteration in stable hash order for paging.
    canonicals: BTreeMap<ShallowHash, CanonicalRecord>,
    evidence: BTreeSet<(ShallowHash, RecordId)>,
    evidence_by_record: BTreeMap<RecordId, ShallowHash>,
    refinements: AHashSet<RefinementLink>,
    runs: Vec<RunMarker>,
}

impl CorpusState {
    // ------------------------------------------------------------------
    // Mutation (with consistency checks)
    // ------------------------------------------------------------------

    /// Returns false when the exact record id is already present.
    pub fn apply_raw(&mut self, record: RawRecord) -> bool {
        match self.raws.entry(record.id) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(record);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Validate a canonical batch against the corpus and against itself.
    /// A hash seen twice, stored or in-batch, is a consistency error.
    pub fn check_canonical_batch(&self, records: &[CanonicalRecord]) -> StoreResult<()> {
        let mut in_batch: AHashSet<ShallowHash> = AHashSet::new();
        for record in records {
            if self.canonicals.contains_key(&record.hash) || !in_batch.insert(record.hash) {
                return Err(StoreError::Consistency(format!(
                    "duplicate canonical record for hash {}",
                    record.hash
                )));
            }
        }
        Ok(())
    }

    pub fn apply_canonical(&mut self, record: CanonicalRecord) {
        self.canonicals.insert(record.hash, record);
    }

    /// Validate an evidence batch. Exact duplicates (stored or in-batch) are
    /// absorbed; a record linked to two different hashes is a consistency
    /// error.
    pub fn check_evidence_batch(&self, links: &[EvidenceLink]) -> StoreResult<()> {
        let mut in_batch: BTreeMap<RecordId, ShallowHash> = BTreeMap::new();
        for link in links {
            let prior = self
                .evidence_by_record
                .get(&link.record)
                .or_else(|| in_batch.get(&link.record));
            match prior {
                Some(existing) if *existing != link.canonical => {
                    return Err(StoreError::Consistency(format!(
                        "raw record {} already linked to hash {}, refusing link to {}",
                        link.record, existing, link.canonical
                    )));
                }
                _ => {
                    in_batch.insert(link.record, link.canonical);
                }
            }
        }
        Ok(())
    }

    pub fn apply_evidence(&mut self, link: EvidenceLink) {
        self.evidence.insert((link.canonical, link.record));
        self.evidence_by_record.insert(link.record, link.canonical);
    }

    /// Validate a refinement batch. Exact duplicates are absorbed; reflexive
    /// links and mirrored pairs (stored or in-batch) are consistency errors.
    pub fn check_refinement_batch(&self, links: &[RefinementLink]) -> StoreResult<()> {
        let mut in_batch: AHashSet<RefinementLink> = AHashSet::new();
        for link in links {
            if link.is_reflexive() {
                return Err(StoreError::Consistency(format!(
                    "reflexive refinement link on hash {}",
                    link.general
                )));
            }
            let mirror = link.mirror();
            if self.refinements.contains(&mirror) || in_batch.contains(&mirror) {
                return Err(StoreError::Consistency(format!(
                    "refinement link ({}, {}) present in both directions",
                    link.general, link.specific
                )));
            }
            in_batch.insert(*link);
        }
        Ok(())
    }

    pub fn apply_refinement(&mut self, link: RefinementLink) {
        self.refinements.insert(link);
    }

    pub fn apply_run_marker(&mut self, marker: RunMarker) {
        self.runs.push(marker);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn has_raw(&self, id: RecordId) -> bool {
        self.raws.contains_key(&id)
    }

    pub fn all_raw_ids(&self) -> BTreeSet<RecordId> {
        self.raws.keys().copied().collect()
    }

    pub fn unlinked_raw_ids(&self) -> BTreeSet<RecordId> {
        self.raws
            .keys()
            .filter(|id| !self.evidence_by_record.contains_key(id))
            .copied()
            .collect()
    }

    pub fn fetch_raws(&self, ids: &BTreeSet<RecordId>) -> Vec<RawRecord> {
        ids.iter()
            .filter_map(|id| self.raws.get(id).cloned())
            .collect()
    }

    pub fn known_hashes(&self) -> AHashSet<ShallowHash> {
        self.canonicals.keys().copied().collect()
    }

    pub fn refinement_links(&self) -> AHashSet<RefinementLink> {
        self.refinements.clone()
    }

    pub fn linked_record_ids(&self) -> BTreeSet<RecordId> {
        self.evidence_by_record.keys().copied().collect()
    }

    pub fn fetch_canonical(
        &self,
        filter: &HashFilter,
        offset: usize,
        limit: usize,
    ) -> Vec<CanonicalRecord> {
        self.canonicals
            .values()
            .filter(|record| filter.admits(record.hash))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn latest_update_time(&self) -> Option<DateTime<Utc>> {
        self.runs.iter().map(|marker| marker.run_at).max()
    }

    pub fn canonical_record(&self, hash: ShallowHash) -> Option<CanonicalRecord> {
        self.canonicals.get(&hash).cloned()
    }

    pub fn evidence_for(&self, hash: ShallowHash) -> Vec<RecordId> {
        self.evidence
            .range((hash, RecordId::from_uuid(uuid::Uuid::nil()))..)
            .take_while(|(h, _)| *h == hash)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn links_touching(&self, hash: ShallowHash) -> Vec<RefinementLink> {
        let mut links: Vec<RefinementLink> = self
            .refinements
            .iter()
            .filter(|link| link.general == hash || link.specific == hash)
            .copied()
            .collect();
        links.sort_by_key(|link| (link.general, link.specific));
        links
    }
}
