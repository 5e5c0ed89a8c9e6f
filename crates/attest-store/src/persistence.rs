//! Embedded append-only file store.
//!
//! One log file holds every persisted relation as length-prefixed bincode
//! frames (u32 length + payload). Opening replays the log into the shared
//! in-memory indexes; a torn frame at the tail (crash mid-write) is
//! truncated away. Appends are flushed and synced per batch, so a batch is
//! either fully durable or absent after a crash.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use std::collections::BTreeSet;

use ahash::AHashSet;
use attest_model::{RawRecord, RecordId, ShallowHash};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::state::CorpusState;
use crate::{
    CanonicalRecord, CorpusStore, EvidenceLink, HashFilter, RawSource, RefinementLink, RunMarker,
    StoreError, StoreResult,
};

const LOG_FILE: &str = "corpus.log";

#[derive(Debug, Serialize, Deserialize)]
enum LogEntry {
    Raw(RawRecord),
    Canonical(CanonicalRecord),
    Evidence(EvidenceLink),
    Refinement(RefinementLink),
    Run(RunMarker),
}

struct Inner {
    state: CorpusState,
    writer: BufWriter<File>,
}

/// Durable corpus store backed by a single append-only log.
///
/// The handle is opened explicitly, passed into each run, and closed when
/// the caller is done with it; nothing here is process-global.
pub struct FileStore {
    dir: PathBuf,
    inner: RwLock<Inner>,
}

impl FileStore {
    /// Open (or create) the store under `dir`, replaying any existing log.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(LOG_FILE);

        let mut state = CorpusState::default();
        let valid_len = replay(&path, &mut state)?;

        let file = OpenOptions::new().create(true).write(true).open(&path)?;
        // Drop a torn tail frame left by a crash mid-append.
        file.set_len(valid_len)?;
        let mut file = file;
        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            dir,
            inner: RwLock::new(Inner {
                state,
                writer: BufWriter::new(file),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Flush and sync outstanding writes, consuming the handle.
    pub fn close(self) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.writer.flush()?;
        inner.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Ingest raw records. Duplicate ids are ignored.
    pub fn insert_raw_records(&self, records: Vec<RawRecord>) -> StoreResult<usize> {
        let mut inner = self.inner.write();
        let fresh: Vec<RawRecord> = records
            .into_iter()
            .filter(|record| !inner.state.has_raw(record.id))
            .collect();
        let entries: Vec<LogEntry> = fresh.iter().cloned().map(LogEntry::Raw).collect();
        append_batch(&mut inner.writer, &entries)?;
        let mut added = 0;
        for record in fresh {
            if inner.state.apply_raw(record) {
                added += 1;
            }
        }
        Ok(added)
    }
}

/// Replay the log into `state`, returning the length of the valid prefix.
fn replay(path: &Path, state: &mut CorpusState) -> StoreResult<u64> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let mut valid_len: u64 = 0;
    let mut entries: u64 = 0;
    let mut len_buf = [0u8; 4];
    loop {
        match file.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        match file.read_exact(&mut payload) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        let entry: LogEntry = bincode::deserialize(&payload).map_err(StoreError::codec)?;
        match entry {
            LogEntry::Raw(record) => {
                state.apply_raw(record);
            }
            LogEntry::Canonical(record) => state.apply_canonical(record),
            LogEntry::Evidence(link) => state.apply_evidence(link),
            LogEntry::Refinement(link) => state.apply_refinement(link),
            LogEntry::Run(marker) => state.apply_run_marker(marker),
        }
        valid_len += 4 + len as u64;
        entries += 1;
    }
    tracing::debug!(entries, path = %path.display(), "replayed corpus log");
    Ok(valid_len)
}

/// Append a batch of frames, then flush and sync once.
fn append_batch(writer: &mut BufWriter<File>, entries: &[LogEntry]) -> StoreResult<()> {
    for entry in entries {
        let payload = bincode::serialize(entry).map_err(StoreError::codec)?;
        writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        writer.write_all(&payload)?;
    }
    writer.flush()?;
    writer.get_ref().sync_data()?;
    Ok(())
}

impl RawSource for FileStore {
    fn all_ids(&self) -> StoreResult<BTreeSet<RecordId>> {
        Ok(self.inner.read().state.all_raw_ids())
    }

    fn unlinked_ids(&self) -> StoreResult<BTreeSet<RecordId>> {
        Ok(self.inner.read().state.unlinked_raw_ids())
    }

    fn fetch_records(&self, ids: &BTreeSet<RecordId>) -> StoreResult<Vec<RawRecord>> {
        Ok(self.inner.read().state.fetch_raws(ids))
    }
}

impl CorpusStore for FileStore {
    fn insert_canonical_records(&self, records: &[CanonicalRecord]) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.state.check_canonical_batch(records)?;
        let entries: Vec<LogEntry> = records.iter().cloned().map(LogEntry::Canonical).collect();
        append_batch(&mut inner.writer, &entries)?;
        for record in records {
            inner.state.apply_canonical(record.clone());
        }
        Ok(())
    }

    fn insert_evidence_links(&self, links: &[EvidenceLink]) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.state.check_evidence_batch(links)?;
        let entries: Vec<LogEntry> = links.iter().copied().map(LogEntry::Evidence).collect();
        append_batch(&mut inner.writer, &entries)?;
        for link in links {
            inner.state.apply_evidence(*link);
        }
        Ok(())
    }

    fn insert_refinement_links(&self, links: &[RefinementLink]) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.state.check_refinement_batch(links)?;
        let entries: Vec<LogEntry> = links.iter().copied().map(LogEntry::Refinement).collect();
        append_batch(&mut inner.writer, &entries)?;
        for link in links {
            inner.state.apply_refinement(*link);
        }
        Ok(())
    }

    fn known_hashes(&self) -> StoreResult<AHashSet<ShallowHash>> {
        Ok(self.inner.read().state.known_hashes())
    }

    fn existing_refinement_links(&self) -> StoreResult<AHashSet<RefinementLink>> {
        Ok(self.inner.read().state.refinement_links())
    }

    fn linked_record_ids(&self) -> StoreResult<BTreeSet<RecordId>> {
        Ok(self.inner.read().state.linked_record_ids())
    }

    fn fetch_canonical(
        &self,
        filter: &HashFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<CanonicalRecord>> {
        Ok(self.inner.read().state.fetch_canonical(filter, offset, limit))
    }

    fn add_run_marker(&self, marker: RunMarker) -> StoreResult<()> {
        let mut inner = self.inner.write();
        append_batch(&mut inner.writer, &[LogEntry::Run(marker)])?;
        inner.state.apply_run_marker(marker);
        Ok(())
    }

    fn latest_update_time(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.inner.read().state.latest_update_time())
    }

    fn canonical_record(&self, hash: ShallowHash) -> StoreResult<Option<CanonicalRecord>> {
        Ok(self.inner.read().state.canonical_record(hash))
    }

    fn evidence_for(&self, hash: ShallowHash) -> StoreResult<Vec<RecordId>> {
        Ok(self.inner.read().state.evidence_for(hash))
    }

    fn links_touching(&self, hash: ShallowHash) -> StoreResult<Vec<RefinementLink>> {
        Ok(self.inner.read().state.links_touching(hash))
    }
}
