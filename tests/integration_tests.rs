//! Integration tests for the complete Attest pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Raw ingestion → FileStore → Dedup → Refinement scan
//! - Durability across store reopen
//! - Create/supplement equivalence on the embedded store
//!
//! Run with: cargo test --test integration_tests

use attest_assembly::{AssemblyConfig, CorpusManager, Ontology, OntologyComparator};
use attest_model::{AssertionContent, EntityRef, Evidence, Qualifiers, RawRecord, RecordId};
use attest_store::{CorpusStore, FileStore, FsCheckpointStore, RawSource};
use tempfile::tempdir;
use uuid::Uuid;

fn record(n: u128, content: &AssertionContent) -> RawRecord {
    RawRecord {
        id: RecordId::from_uuid(Uuid::from_u128(n)),
        payload: serde_json::to_string(content).unwrap(),
        evidence: Evidence::new(format!("sentence {n}"), "reader-a", format!("doc:{n}")),
    }
}

fn inhibition(subject: Option<(&str, &str)>, site: Option<&str>) -> AssertionContent {
    AssertionContent::Relation {
        predicate: "inhibits".into(),
        subject: subject.map(|(ns, id)| EntityRef::grounded(id, ns, id)),
        object: EntityRef::grounded("COX1", "gene", "cox1"),
        qualifiers: Qualifiers {
            site: site.map(String::from),
            condition: None,
        },
    }
}

fn manager() -> CorpusManager {
    let mut ontology = Ontology::new();
    ontology.add_is_a("chebi:aspirin", "chebi:nsaid");
    CorpusManager::new(
        AssemblyConfig::default().with_batch_size(2).with_workers(2),
        Box::new(OntologyComparator::new(ontology)),
    )
}

// ============================================================================
// End-to-end lifecycle on the embedded store
// ============================================================================

#[test]
fn test_file_store_create_supplement_lifecycle() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().join("corpus");
    let ckpt_dir = dir.path().join("checkpoints");

    let general = inhibition(None, None);
    let nsaid = inhibition(Some(("chebi", "nsaid")), None);
    let aspirin = inhibition(Some(("chebi", "aspirin")), None);

    // Initial build from three records, two of them content-identical.
    {
        let store = FileStore::open(&data_dir).unwrap();
        store
            .insert_raw_records(vec![
                record(1, &general),
                record(2, &general),
                record(3, &nsaid),
            ])
            .unwrap();
        let checkpoints = FsCheckpointStore::open(&ckpt_dir).unwrap();
        let completed = manager()
            .create_corpus(&store, &store, &checkpoints, false)
            .unwrap();
        assert!(completed);
        store.close().unwrap();
    }

    // Everything survives a reopen: records, links, run marker.
    {
        let store = FileStore::open(&data_dir).unwrap();
        assert_eq!(store.known_hashes().unwrap().len(), 2);
        assert_eq!(
            store.evidence_for(general.shallow_hash()).unwrap(),
            vec![
                RecordId::from_uuid(Uuid::from_u128(1)),
                RecordId::from_uuid(Uuid::from_u128(2))
            ]
        );
        let links = store.existing_refinement_links().unwrap();
        assert_eq!(links.len(), 1);
        let link = links.iter().next().unwrap();
        assert_eq!(link.general, general.shallow_hash());
        assert_eq!(link.specific, nsaid.shallow_hash());
        assert!(store.latest_update_time().unwrap().is_some());
        store.close().unwrap();
    }

    // Supplement with a more specific assertion; only the increment is new.
    {
        let store = FileStore::open(&data_dir).unwrap();
        store.insert_raw_records(vec![record(4, &aspirin)]).unwrap();
        assert_eq!(store.unlinked_ids().unwrap().len(), 1);

        let checkpoints = FsCheckpointStore::open(&ckpt_dir).unwrap();
        manager()
            .supplement_corpus(&store, &store, &checkpoints, false)
            .unwrap();
        store.close().unwrap();
    }

    // Final state: aspirin refines both the nsaid assertion (ontology) and
    // the subjectless general form.
    {
        let store = FileStore::open(&data_dir).unwrap();
        assert_eq!(store.known_hashes().unwrap().len(), 3);
        let links = store.existing_refinement_links().unwrap();
        assert_eq!(links.len(), 3);
        let touching = store.links_touching(aspirin.shallow_hash()).unwrap();
        assert_eq!(touching.len(), 2);
        assert!(touching.iter().all(|l| l.specific == aspirin.shallow_hash()));
        store.close().unwrap();
    }
}

// ============================================================================
// Supplement equivalence against a one-shot build
// ============================================================================

#[test]
fn test_incremental_build_matches_full_build_on_disk() {
    let dir = tempdir().unwrap();

    let contents = [
        inhibition(None, None),
        inhibition(Some(("chebi", "nsaid")), None),
        inhibition(Some(("chebi", "aspirin")), None),
        inhibition(Some(("chebi", "aspirin")), Some("ser-530")),
    ];

    // Full build over everything at once.
    let full_dir = dir.path().join("full");
    {
        let store = FileStore::open(&full_dir).unwrap();
        store
            .insert_raw_records(
                contents
                    .iter()
                    .enumerate()
                    .map(|(n, c)| record(n as u128 + 1, c))
                    .collect(),
            )
            .unwrap();
        let checkpoints = FsCheckpointStore::open(dir.path().join("full-ckpt")).unwrap();
        manager()
            .create_corpus(&store, &store, &checkpoints, false)
            .unwrap();
        store.close().unwrap();
    }

    // Create over the first half, supplement the second.
    let inc_dir = dir.path().join("incremental");
    {
        let store = FileStore::open(&inc_dir).unwrap();
        let checkpoints = FsCheckpointStore::open(dir.path().join("inc-ckpt")).unwrap();
        store
            .insert_raw_records(vec![record(1, &contents[0]), record(2, &contents[1])])
            .unwrap();
        manager()
            .create_corpus(&store, &store, &checkpoints, false)
            .unwrap();
        store
            .insert_raw_records(vec![record(3, &contents[2]), record(4, &contents[3])])
            .unwrap();
        manager()
            .supplement_corpus(&store, &store, &checkpoints, false)
            .unwrap();
        store.close().unwrap();
    }

    let full = FileStore::open(&full_dir).unwrap();
    let incremental = FileStore::open(&inc_dir).unwrap();
    assert_eq!(
        full.known_hashes().unwrap(),
        incremental.known_hashes().unwrap()
    );
    assert_eq!(
        full.existing_refinement_links().unwrap(),
        incremental.existing_refinement_links().unwrap()
    );
}

// ============================================================================
// Checkpoint cleanup on success
// ============================================================================

#[test]
fn test_checkpoints_are_gone_after_success() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path().join("corpus")).unwrap();
    store
        .insert_raw_records(vec![record(1, &inhibition(None, None))])
        .unwrap();

    let ckpt_dir = dir.path().join("checkpoints");
    let checkpoints = FsCheckpointStore::open(&ckpt_dir).unwrap();
    manager()
        .create_corpus(&store, &store, &checkpoints, false)
        .unwrap();
    store.close().unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(&ckpt_dir).unwrap().collect();
    assert!(leftovers.is_empty(), "checkpoints survived a successful run");
}
