//! Supplementing over disjoint increments must be indistinguishable from
//! one full build over the union.

use ahash::AHashSet;
use attest_assembly::{AssemblyConfig, CorpusManager, Ontology, OntologyComparator};
use attest_model::{AssertionContent, EntityRef, Evidence, Qualifiers, RawRecord, RecordId, ShallowHash};
use attest_store::{CorpusStore, MemoryCheckpointStore, MemoryStore, RefinementLink};
use uuid::Uuid;

fn record_id(n: u128) -> RecordId {
    RecordId::from_uuid(Uuid::from_u128(n))
}

fn raw(n: u128, content: &AssertionContent) -> RawRecord {
    RawRecord {
        id: record_id(n),
        payload: serde_json::to_string(content).unwrap(),
        evidence: Evidence::new(format!("sentence {n}"), "reader-a", format!("doc:{n}")),
    }
}

fn relation(subject: Option<(&str, &str)>, object: &str, site: Option<&str>) -> AssertionContent {
    AssertionContent::Relation {
        predicate: "inhibits".into(),
        subject: subject.map(|(ns, id)| EntityRef::grounded(id, ns, id)),
        object: EntityRef::named(object),
        qualifiers: Qualifiers {
            site: site.map(String::from),
            condition: None,
        },
    }
}

fn ontology() -> Ontology {
    let mut ontology = Ontology::new();
    ontology.add_is_a("chebi:aspirin", "chebi:nsaid");
    ontology.add_is_a("chebi:ibuprofen", "chebi:nsaid");
    ontology
}

fn manager(batch_size: usize) -> CorpusManager {
    CorpusManager::new(
        AssemblyConfig::default().with_batch_size(batch_size),
        Box::new(OntologyComparator::new(ontology())),
    )
}

/// Mixed corpus: duplicates, a refinement ladder, unrelated noise.
fn base_records() -> Vec<RawRecord> {
    vec![
        raw(1, &relation(None, "COX1", None)),
        raw(2, &relation(None, "COX1", None)),
        raw(3, &relation(Some(("chebi", "nsaid")), "COX1", None)),
        raw(4, &relation(Some(("chebi", "aspirin")), "COX1", None)),
        raw(5, &relation(None, "EGFR", None)),
    ]
}

fn increment_records() -> Vec<RawRecord> {
    vec![
        raw(6, &relation(Some(("chebi", "ibuprofen")), "COX1", None)),
        raw(7, &relation(Some(("chebi", "aspirin")), "COX1", Some("ser-530"))),
        raw(8, &relation(None, "COX1", None)), // duplicate of an old record
        raw(9, &relation(None, "TP53", None)),
    ]
}

fn corpus_fingerprint(
    store: &MemoryStore,
) -> (AHashSet<ShallowHash>, AHashSet<RefinementLink>, Vec<(ShallowHash, Vec<RecordId>)>) {
    let hashes = store.known_hashes().unwrap();
    let links = store.existing_refinement_links().unwrap();
    let mut evidence: Vec<(ShallowHash, Vec<RecordId>)> = hashes
        .iter()
        .map(|hash| (*hash, store.evidence_for(*hash).unwrap()))
        .collect();
    evidence.sort_by_key(|(hash, _)| *hash);
    (hashes, links, evidence)
}

#[test]
fn supplement_equals_full_rebuild() {
    // One-shot build over the union.
    let full_store = MemoryStore::new();
    let full_checkpoints = MemoryCheckpointStore::new();
    let mut all = base_records();
    all.extend(increment_records());
    full_store.insert_raw_records(all).unwrap();
    manager(3)
        .create_corpus(&full_store, &full_store, &full_checkpoints, false)
        .unwrap();

    // Create, then supplement with the increment.
    let inc_store = MemoryStore::new();
    let inc_checkpoints = MemoryCheckpointStore::new();
    inc_store.insert_raw_records(base_records()).unwrap();
    let manager = manager(3);
    manager
        .create_corpus(&inc_store, &inc_store, &inc_checkpoints, false)
        .unwrap();
    inc_store.insert_raw_records(increment_records()).unwrap();
    manager
        .supplement_corpus(&inc_store, &inc_store, &inc_checkpoints, false)
        .unwrap();

    assert_eq!(corpus_fingerprint(&full_store), corpus_fingerprint(&inc_store));
}

#[test]
fn repeated_disjoint_supplements_accumulate_correctly() {
    let full_store = MemoryStore::new();
    let mut all = base_records();
    all.extend(increment_records());
    full_store.insert_raw_records(all).unwrap();
    manager(2)
        .create_corpus(&full_store, &full_store, &MemoryCheckpointStore::new(), false)
        .unwrap();

    // Same corpus fed one record at a time through supplements.
    let step_store = MemoryStore::new();
    let step_checkpoints = MemoryCheckpointStore::new();
    let manager = manager(2);
    let mut records = base_records();
    records.extend(increment_records());
    let first = records.remove(0);
    step_store.insert_raw_records(vec![first]).unwrap();
    manager
        .create_corpus(&step_store, &step_store, &step_checkpoints, false)
        .unwrap();
    for record in records {
        step_store.insert_raw_records(vec![record]).unwrap();
        manager
            .supplement_corpus(&step_store, &step_store, &step_checkpoints, false)
            .unwrap();
    }

    assert_eq!(corpus_fingerprint(&full_store), corpus_fingerprint(&step_store));
}

#[test]
fn empty_supplement_is_a_no_op() {
    let store = MemoryStore::new();
    let checkpoints = MemoryCheckpointStore::new();
    store.insert_raw_records(base_records()).unwrap();
    let manager = manager(3);
    manager
        .create_corpus(&store, &store, &checkpoints, false)
        .unwrap();

    let before = corpus_fingerprint(&store);
    let completed = manager
        .supplement_corpus(&store, &store, &checkpoints, false)
        .unwrap();
    assert!(completed);
    assert_eq!(corpus_fingerprint(&store), before);
}

#[test]
fn supplement_on_empty_corpus_acts_as_first_build() {
    let store = MemoryStore::new();
    let checkpoints = MemoryCheckpointStore::new();
    store.insert_raw_records(base_records()).unwrap();

    // No create first; supplement warns and builds everything.
    manager(3)
        .supplement_corpus(&store, &store, &checkpoints, false)
        .unwrap();

    let reference = MemoryStore::new();
    reference.insert_raw_records(base_records()).unwrap();
    manager(3)
        .create_corpus(&reference, &reference, &MemoryCheckpointStore::new(), false)
        .unwrap();

    let (hashes, links, evidence) = corpus_fingerprint(&store);
    let (ref_hashes, ref_links, ref_evidence) = corpus_fingerprint(&reference);
    assert_eq!(hashes, ref_hashes);
    assert_eq!(links, ref_links);
    assert_eq!(evidence, ref_evidence);
}
