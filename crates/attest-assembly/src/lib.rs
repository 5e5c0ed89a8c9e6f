//! Attest Corpus Assembly
//!
//! Turns an ever-growing pile of raw extracted assertions into a canonical
//! corpus plus a directed refinement relation:
//!
//! 1. **Dedup** ([`Deduplicator`]): raw records collapse into canonical
//!    records by content-only hash; every raw record gets an evidence link.
//! 2. **Refinement scan** ([`BatchScanner`]): canonical records are
//!    compared pairwise in memory-bounded batches, asking a
//!    [`RefinementComparator`] whether one is a more specific instance of
//!    the other. Links accumulate in a bounded buffer flushed at a
//!    threshold.
//! 3. **Orchestration** ([`CorpusManager`]): `create_corpus` builds from
//!    scratch, `supplement_corpus` folds in only what is new; both write a
//!    run marker on success and checkpoint each phase so an interrupted
//!    run resumes with `continuing = true` instead of starting over.
//!
//! Supplementing repeatedly over disjoint increments yields exactly the
//! corpus a single full build over the union would have produced.

pub mod compare;
pub mod config;
pub mod dedup;
pub mod error;
pub mod manager;
pub mod recovery;
pub mod scan;

pub use compare::{Ontology, OntologyComparator, RefinementComparator};
pub use config::AssemblyConfig;
pub use dedup::{DedupOutcome, Deduplicator};
pub use error::AssemblyError;
pub use manager::CorpusManager;
pub use scan::{BatchScanner, ScanOutcome};
