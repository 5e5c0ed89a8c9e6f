//! Deduplication of raw records into canonical records.

use ahash::AHashSet;
use attest_model::{RawRecord, ShallowHash};
use attest_store::{CanonicalRecord, CorpusStore, EvidenceLink};
use tracing::{debug, warn};

use crate::error::AssemblyError;

/// What one dedup pass produced.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Hashes whose canonical record was created by this run.
    pub created: AHashSet<ShallowHash>,
    pub records_seen: usize,
    pub records_skipped: usize,
}

/// Streams batches of raw records into the canonical corpus.
///
/// Owns the known-hash set for the duration of the run: the pre-existing
/// corpus hashes plus everything created so far. The first record seen for
/// a fresh hash contributes its (evidence-stripped) content as the
/// canonical record; every decodable record contributes an evidence link.
/// The guarantee is one canonical record per distinct hash no matter how
/// records fall across batch boundaries.
pub struct Deduplicator<'a> {
    store: &'a dyn CorpusStore,
    known: AHashSet<ShallowHash>,
    created: AHashSet<ShallowHash>,
    records_seen: usize,
    records_skipped: usize,
}

impl<'a> Deduplicator<'a> {
    /// `known` is the pre-existing hash set; `created` is what this run
    /// already made before a resume (empty on a fresh start).
    pub fn new(
        store: &'a dyn CorpusStore,
        known: AHashSet<ShallowHash>,
        created: AHashSet<ShallowHash>,
    ) -> Self {
        let mut all_known = known;
        all_known.extend(created.iter().copied());
        Self {
            store,
            known: all_known,
            created,
            records_seen: 0,
            records_skipped: 0,
        }
    }

    /// Hashes created so far this run.
    pub fn created(&self) -> &AHashSet<ShallowHash> {
        &self.created
    }

    /// Dedup one batch and persist its canonical records and evidence
    /// links in one store round-trip each.
    ///
    /// Records that fail to decode or normalize are logged and skipped;
    /// they never abort the batch.
    pub fn process_batch(&mut self, batch: &[RawRecord]) -> Result<(), AssemblyError> {
        let mut fresh: Vec<CanonicalRecord> = Vec::new();
        let mut fresh_hashes: AHashSet<ShallowHash> = AHashSet::new();
        let mut links: Vec<EvidenceLink> = Vec::new();

        for record in batch {
            self.records_seen += 1;
            let content = match record.decode() {
                Ok(content) => content,
                Err(err) => {
                    self.records_skipped += 1;
                    warn!(record_id = %record.id, error = %err, "skipping undecodable raw record");
                    continue;
                }
            };
            let hash = content.shallow_hash();
            if !self.known.contains(&hash) && fresh_hashes.insert(hash) {
                fresh.push(CanonicalRecord { hash, content });
            }
            links.push(EvidenceLink {
                canonical: hash,
                record: record.id,
            });
        }

        if !fresh.is_empty() {
            self.store.insert_canonical_records(&fresh)?;
        }
        if !links.is_empty() {
            self.store.insert_evidence_links(&links)?;
        }

        for record in &fresh {
            self.known.insert(record.hash);
            self.created.insert(record.hash);
        }
        debug!(
            batch = batch.len(),
            fresh = fresh.len(),
            links = links.len(),
            "dedup batch committed"
        );
        Ok(())
    }

    pub fn finish(self) -> DedupOutcome {
        DedupOutcome {
            created: self.created,
            records_seen: self.records_seen,
            records_skipped: self.records_skipped,
        }
    }
}
