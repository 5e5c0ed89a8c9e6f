//! Batch pairwise refinement scanning.
//!
//! Produces the complete refinement-link set without materializing all
//! pairs or holding the whole corpus in memory: records are paged in
//! batches, every unordered pair is probed exactly once (within a batch,
//! and across ordered batch index pairs), and found links accumulate in a
//! bounded buffer that flushes to the store at a threshold.
//!
//! Pair probing is the one parallel part of assembly. A fixed pool of
//! workers consumes row-range jobs from a bounded channel and returns link
//! vectors through another bounded channel; the owning thread merges them
//! serially, so the link buffer has exactly one writer.

use ahash::AHashSet;
use attest_store::{CanonicalRecord, CorpusStore, RefinementLink, StoreError};
use crossbeam_channel::bounded;
use tracing::{debug, warn};

use crate::compare::{probe_pair, Direction, RefinementComparator};
use crate::config::AssemblyConfig;
use crate::error::AssemblyError;

/// Rows per pool job. Small enough to balance ragged rows, large enough
/// that channel traffic is noise.
const JOB_ROWS: usize = 64;

/// Counters from one scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOutcome {
    /// Links persisted by this scanner.
    pub links_added: usize,
    pub comparisons: u64,
    pub flushes: usize,
}

/// Accumulates refinement links over a sequence of batch passes.
///
/// `existing` carries every link already persisted (prior runs plus this
/// run's flushes) so nothing is double-inserted; `pending` is the bounded
/// buffer of links found but not yet flushed. Both are owned here — pool
/// workers only ever return results.
pub struct BatchScanner<'a> {
    comparator: &'a dyn RefinementComparator,
    config: &'a AssemblyConfig,
    store: &'a dyn CorpusStore,
    existing: AHashSet<RefinementLink>,
    pending: AHashSet<RefinementLink>,
    links_added: usize,
    comparisons: u64,
    flushes: usize,
}

impl<'a> BatchScanner<'a> {
    pub fn new(
        comparator: &'a dyn RefinementComparator,
        config: &'a AssemblyConfig,
        store: &'a dyn CorpusStore,
        existing: AHashSet<RefinementLink>,
    ) -> Self {
        Self {
            comparator,
            config,
            store,
            existing,
            pending: AHashSet::new(),
            links_added: 0,
            comparisons: 0,
            flushes: 0,
        }
    }

    /// Re-admit the unflushed buffer from a scan checkpoint.
    pub fn restore_pending(
        &mut self,
        links: impl IntoIterator<Item = RefinementLink>,
    ) -> Result<(), AssemblyError> {
        for link in links {
            self.admit(link)?;
        }
        Ok(())
    }

    /// Snapshot of the unflushed buffer, for checkpointing.
    pub fn pending_links(&self) -> Vec<RefinementLink> {
        self.pending.iter().copied().collect()
    }

    /// Probe every unordered pair within `batch`.
    pub fn scan_intra(&mut self, batch: &[CanonicalRecord]) -> Result<(), AssemblyError> {
        let records: Vec<&CanonicalRecord> = batch.iter().collect();
        let n = records.len() as u64;
        self.comparisons += n.saturating_sub(1) * n / 2;
        let links = compare_records(self.comparator, &records, None, self.config.workers)?;
        self.admit_all(links)?;
        self.flush_if_full()
    }

    /// Probe every pair with one side in `left` and the other in `right`.
    /// The two slices must be disjoint.
    pub fn scan_cross(
        &mut self,
        left: &[CanonicalRecord],
        right: &[CanonicalRecord],
    ) -> Result<(), AssemblyError> {
        let records: Vec<&CanonicalRecord> = left.iter().chain(right.iter()).collect();
        self.comparisons += left.len() as u64 * right.len() as u64;
        let links = compare_records(
            self.comparator,
            &records,
            Some(left.len()),
            self.config.workers,
        )?;
        self.admit_all(links)?;
        self.flush_if_full()
    }

    fn admit_all(&mut self, links: Vec<RefinementLink>) -> Result<(), AssemblyError> {
        for link in links {
            self.admit(link)?;
        }
        Ok(())
    }

    /// Merge one found link into the buffer.
    ///
    /// Already-persisted and already-pending links are skipped (a resumed
    /// run legitimately re-probes pairs from its interrupted outer batch);
    /// a reflexive link or a mirror of a known link is fatal.
    fn admit(&mut self, link: RefinementLink) -> Result<(), AssemblyError> {
        if link.is_reflexive() {
            return Err(AssemblyError::Consistency(format!(
                "refinement scan produced a self-link on hash {}",
                link.general
            )));
        }
        if self.existing.contains(&link) || self.pending.contains(&link) {
            return Ok(());
        }
        let mirror = link.mirror();
        if self.existing.contains(&mirror) || self.pending.contains(&mirror) {
            return Err(AssemblyError::Consistency(format!(
                "refinement link ({}, {}) found in both directions",
                link.general, link.specific
            )));
        }
        self.pending.insert(link);
        Ok(())
    }

    /// Flush when the buffer has reached the configured threshold.
    pub fn flush_if_full(&mut self) -> Result<(), AssemblyError> {
        if self.pending.len() >= self.config.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Persist the buffer with bounded retries.
    ///
    /// The buffer is kept intact until the insert succeeds, so an aborted
    /// run can still checkpoint it. Consistency and codec errors are never
    /// retried.
    fn flush(&mut self) -> Result<(), AssemblyError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch: Vec<RefinementLink> = self.pending.iter().copied().collect();
        let attempts = self.config.flush_retries.max(1);
        let mut last_err: Option<StoreError> = None;
        for attempt in 1..=attempts {
            match self.store.insert_refinement_links(&batch) {
                Ok(()) => {
                    self.existing.extend(batch.iter().copied());
                    self.links_added += batch.len();
                    self.pending.clear();
                    self.flushes += 1;
                    debug!(links = batch.len(), "flushed refinement links");
                    return Ok(());
                }
                Err(err @ (StoreError::Consistency(_) | StoreError::Codec(_))) => {
                    return Err(err.into());
                }
                Err(err) => {
                    warn!(attempt, max = attempts, error = %err, "refinement flush failed");
                    last_err = Some(err);
                }
            }
        }
        // Exhausted: leave the buffer unflushed for the checkpoint.
        Err(AssemblyError::Store(last_err.expect("at least one attempt")))
    }

    /// Flush whatever remains and report the scan counters.
    pub fn finish(mut self) -> Result<ScanOutcome, AssemblyError> {
        self.flush()?;
        Ok(ScanOutcome {
            links_added: self.links_added,
            comparisons: self.comparisons,
            flushes: self.flushes,
        })
    }
}

// ============================================================================
// Pair probing (inline or pooled)
// ============================================================================

/// Probe the pair set over `records`: all unordered pairs when `split` is
/// `None`, otherwise only pairs crossing index `split`.
fn compare_records(
    comparator: &dyn RefinementComparator,
    records: &[&CanonicalRecord],
    split: Option<usize>,
    workers: usize,
) -> Result<Vec<RefinementLink>, AssemblyError> {
    let row_limit = split.unwrap_or_else(|| records.len().saturating_sub(1));
    if row_limit == 0 {
        return Ok(Vec::new());
    }
    if workers <= 1 {
        return compare_rows(comparator, records, split, 0, row_limit);
    }

    std::thread::scope(|scope| {
        let (job_tx, job_rx) = bounded::<(usize, usize)>(workers * 2);
        let (result_tx, result_rx) =
            bounded::<Result<Vec<RefinementLink>, AssemblyError>>(workers * 2);

        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for (lo, hi) in job_rx {
                    let result = compare_rows(comparator, records, split, lo, hi);
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(result_tx);

        scope.spawn(move || {
            let mut lo = 0;
            while lo < row_limit {
                let hi = (lo + JOB_ROWS).min(row_limit);
                if job_tx.send((lo, hi)).is_err() {
                    break;
                }
                lo = hi;
            }
        });

        let mut links = Vec::new();
        let mut first_err: Option<AssemblyError> = None;
        for result in result_rx {
            match result {
                Ok(mut found) => links.append(&mut found),
                // Keep draining so workers shut down cleanly.
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(links),
        }
    })
}

/// Probe the pairs whose first index lies in `lo..hi`.
fn compare_rows(
    comparator: &dyn RefinementComparator,
    records: &[&CanonicalRecord],
    split: Option<usize>,
    lo: usize,
    hi: usize,
) -> Result<Vec<RefinementLink>, AssemblyError> {
    let mut links = Vec::new();
    for i in lo..hi {
        let columns = match split {
            None => i + 1..records.len(),
            Some(split) => split..records.len(),
        };
        for j in columns {
            let a = records[i];
            let b = records[j];
            match probe_pair(comparator, &a.content, &b.content)? {
                Some(Direction::FirstRefinesSecond) => {
                    links.push(RefinementLink::new(b.hash, a.hash));
                }
                Some(Direction::SecondRefinesFirst) => {
                    links.push(RefinementLink::new(a.hash, b.hash));
                }
                None => {}
            }
        }
    }
    Ok(links)
}
