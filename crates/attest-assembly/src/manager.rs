//! Corpus manager: orchestrates full and incremental assembly runs.

use std::collections::BTreeSet;

use ahash::AHashSet;
use attest_model::{RecordId, ShallowHash};
use attest_store::{CheckpointStore, CorpusStore, HashFilter, RawSource, RunMarker};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::compare::RefinementComparator;
use crate::config::AssemblyConfig;
use crate::dedup::Deduplicator;
use crate::error::AssemblyError;
use crate::recovery::{
    self, DedupCheckpoint, IdsCheckpoint, ScanCheckpoint, PHASE_DEDUP, PHASE_IDS, PHASE_SCAN,
};
use crate::scan::BatchScanner;

const RUN_CREATE: &str = "create";
const RUN_SUPPLEMENT: &str = "supplement";

/// Which raw ids a run works on.
enum IdSelection {
    All,
    Unlinked,
}

/// Which canonical records the refinement scan pairs up.
enum ScanScope {
    /// Every pair in the corpus.
    Full,
    /// Pairs within the increment, and increment x pre-existing. Pairs
    /// entirely inside the pre-existing corpus were linked by prior runs
    /// and are never recomputed.
    Increment(AHashSet<ShallowHash>),
}

/// Drives `create` and `supplement` runs over explicitly passed store,
/// source, and checkpoint handles.
///
/// Both entry points are idempotent and safely re-invocable after a
/// partial failure; with `continuing = true` each phase resumes from its
/// checkpoint instead of recomputing.
pub struct CorpusManager {
    config: AssemblyConfig,
    comparator: Box<dyn RefinementComparator>,
}

impl CorpusManager {
    pub fn new(config: AssemblyConfig, comparator: Box<dyn RefinementComparator>) -> Self {
        Self { config, comparator }
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Build the canonical corpus and its refinement links from all raw
    /// records. Returns `true` on completion; a run marker with
    /// `corpus_init = true` is recorded.
    pub fn create_corpus(
        &self,
        source: &dyn RawSource,
        store: &dyn CorpusStore,
        checkpoints: &dyn CheckpointStore,
        continuing: bool,
    ) -> Result<bool, AssemblyError> {
        let run = RUN_CREATE;
        let run_started = Utc::now();
        if !continuing {
            checkpoints.clear_run(run)?;
        }

        let ids = self.collect_ids(source, checkpoints, run, continuing, IdSelection::All)?;
        info!(run, total = ids.len(), "deduplicating raw records");
        self.run_dedup(source, store, checkpoints, run, continuing, &ids)?;

        self.run_scan(store, checkpoints, run, continuing, ScanScope::Full)?;

        checkpoints.clear_run(run)?;
        store.add_run_marker(RunMarker {
            run_at: run_started,
            corpus_init: true,
        })?;
        info!(run, "corpus build complete");
        Ok(true)
    }

    /// Fold raw records not yet linked to any canonical record into the
    /// corpus. The result is indistinguishable from having re-run
    /// `create_corpus` over all raw records.
    pub fn supplement_corpus(
        &self,
        source: &dyn RawSource,
        store: &dyn CorpusStore,
        checkpoints: &dyn CheckpointStore,
        continuing: bool,
    ) -> Result<bool, AssemblyError> {
        let run = RUN_SUPPLEMENT;
        let run_started = Utc::now();
        if !continuing {
            checkpoints.clear_run(run)?;
        }

        match store.latest_update_time()? {
            Some(last) => info!(run, last_update = %last, "supplementing corpus"),
            None => warn!(
                run,
                "corpus has no run marker yet; supplement will behave like a first build"
            ),
        }

        let ids = self.collect_ids(source, checkpoints, run, continuing, IdSelection::Unlinked)?;
        info!(run, new_records = ids.len(), "deduplicating new raw records");
        let created = self.run_dedup(source, store, checkpoints, run, continuing, &ids)?;
        info!(run, created = created.len(), "new canonical records");

        self.run_scan(store, checkpoints, run, continuing, ScanScope::Increment(created))?;

        checkpoints.clear_run(run)?;
        store.add_run_marker(RunMarker {
            run_at: run_started,
            corpus_init: false,
        })?;
        info!(run, "corpus supplement complete");
        Ok(true)
    }

    /// Timestamp of the latest completed run.
    pub fn latest_update_time(
        &self,
        store: &dyn CorpusStore,
    ) -> Result<Option<DateTime<Utc>>, AssemblyError> {
        Ok(store.latest_update_time()?)
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    fn collect_ids(
        &self,
        source: &dyn RawSource,
        checkpoints: &dyn CheckpointStore,
        run: &str,
        continuing: bool,
        selection: IdSelection,
    ) -> Result<BTreeSet<RecordId>, AssemblyError> {
        if continuing {
            if let Some(checkpoint) =
                recovery::load::<IdsCheckpoint>(checkpoints, run, PHASE_IDS)?
            {
                info!(run, ids = checkpoint.ids.len(), "resuming from id checkpoint");
                return Ok(checkpoint.ids);
            }
        }
        let ids = match selection {
            IdSelection::All => source.all_ids()?,
            IdSelection::Unlinked => source.unlinked_ids()?,
        };
        recovery::save(checkpoints, run, PHASE_IDS, &IdsCheckpoint { ids: ids.clone() })?;
        Ok(ids)
    }

    /// Dedup `ids` in batches, checkpointing after each committed batch.
    /// Returns the canonical hashes created by this run.
    fn run_dedup(
        &self,
        source: &dyn RawSource,
        store: &dyn CorpusStore,
        checkpoints: &dyn CheckpointStore,
        run: &str,
        continuing: bool,
        ids: &BTreeSet<RecordId>,
    ) -> Result<AHashSet<ShallowHash>, AssemblyError> {
        let checkpoint = if continuing {
            recovery::load::<DedupCheckpoint>(checkpoints, run, PHASE_DEDUP)?
        } else {
            None
        };
        let (mut processed, created_so_far) = match checkpoint {
            Some(checkpoint) => {
                info!(
                    run,
                    processed = checkpoint.processed.len(),
                    created = checkpoint.created.len(),
                    "resuming from dedup checkpoint"
                );
                (
                    checkpoint.processed,
                    checkpoint.created.into_iter().collect::<AHashSet<_>>(),
                )
            }
            None => Default::default(),
        };

        let known = store.known_hashes()?;
        let mut dedup = Deduplicator::new(store, known, created_so_far);

        let remaining: Vec<RecordId> = ids.difference(&processed).copied().collect();
        for chunk in remaining.chunks(self.config.batch_size) {
            let chunk_ids: BTreeSet<RecordId> = chunk.iter().copied().collect();
            let records = source.fetch_records(&chunk_ids)?;
            dedup.process_batch(&records)?;
            processed.extend(chunk.iter().copied());
            recovery::save(
                checkpoints,
                run,
                PHASE_DEDUP,
                &DedupCheckpoint {
                    processed: processed.clone(),
                    created: dedup.created().iter().copied().collect(),
                },
            )?;
        }

        let outcome = dedup.finish();
        info!(
            run,
            seen = outcome.records_seen,
            skipped = outcome.records_skipped,
            created = outcome.created.len(),
            "dedup phase complete"
        );
        Ok(outcome.created)
    }

    /// Refinement scan over `scope`, checkpointing after each completed
    /// outer batch.
    fn run_scan(
        &self,
        store: &dyn CorpusStore,
        checkpoints: &dyn CheckpointStore,
        run: &str,
        continuing: bool,
        scope: ScanScope,
    ) -> Result<(), AssemblyError> {
        let (outer_filter, against_filter) = match scope {
            ScanScope::Full => (HashFilter::all(), None),
            ScanScope::Increment(created) => {
                if created.is_empty() {
                    info!(run, "no new canonical records; skipping refinement scan");
                    return Ok(());
                }
                (
                    HashFilter::include(created.clone()),
                    Some(HashFilter::exclude(created)),
                )
            }
        };

        let existing = store.existing_refinement_links()?;
        let mut scanner = BatchScanner::new(
            self.comparator.as_ref(),
            &self.config,
            store,
            existing,
        );

        let mut completed = 0;
        if continuing {
            if let Some(checkpoint) =
                recovery::load::<ScanCheckpoint>(checkpoints, run, PHASE_SCAN)?
            {
                if checkpoint.batch_size != self.config.batch_size {
                    return Err(AssemblyError::Checkpoint(format!(
                        "scan checkpoint was written with batch size {}, not {}; \
                         resume with the original size or start fresh",
                        checkpoint.batch_size, self.config.batch_size
                    )));
                }
                info!(
                    run,
                    completed = checkpoint.completed_outer,
                    pending = checkpoint.pending.len(),
                    "resuming from scan checkpoint"
                );
                completed = checkpoint.completed_outer;
                scanner.restore_pending(checkpoint.pending)?;
            }
        }

        let batch = self.config.batch_size;
        let mut outer_index = 0;
        loop {
            let outer = store.fetch_canonical(&outer_filter, outer_index * batch, batch)?;
            if outer.is_empty() {
                break;
            }
            if outer_index < completed {
                outer_index += 1;
                continue;
            }

            scanner.scan_intra(&outer)?;

            // Later batches under the same filter: ordered index pairing,
            // so each batch pair is compared exactly once.
            let mut inner_index = outer_index + 1;
            loop {
                let inner = store.fetch_canonical(&outer_filter, inner_index * batch, batch)?;
                if inner.is_empty() {
                    break;
                }
                scanner.scan_cross(&outer, &inner)?;
                inner_index += 1;
            }

            // The pre-existing corpus, for incremental runs.
            if let Some(against) = &against_filter {
                let mut against_index = 0;
                loop {
                    let inner = store.fetch_canonical(against, against_index * batch, batch)?;
                    if inner.is_empty() {
                        break;
                    }
                    scanner.scan_cross(&outer, &inner)?;
                    against_index += 1;
                }
            }

            outer_index += 1;
            recovery::save(
                checkpoints,
                run,
                PHASE_SCAN,
                &ScanCheckpoint {
                    batch_size: batch,
                    completed_outer: outer_index,
                    pending: scanner.pending_links(),
                },
            )?;
        }

        let outcome = scanner.finish()?;
        info!(
            run,
            comparisons = outcome.comparisons,
            links = outcome.links_added,
            flushes = outcome.flushes,
            "refinement scan complete"
        );
        Ok(())
    }
}
