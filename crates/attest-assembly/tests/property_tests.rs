//! Randomized corpora: dedup and scan invariants must hold regardless of
//! content mix, duplication pattern, and batch geometry.

use ahash::AHashSet;
use attest_assembly::{
    AssemblyConfig, CorpusManager, Ontology, OntologyComparator, RefinementComparator,
};
use attest_model::{AssertionContent, EntityRef, Evidence, Qualifiers, RawRecord, RecordId};
use attest_store::{CorpusStore, MemoryCheckpointStore, MemoryStore};
use proptest::prelude::*;
use uuid::Uuid;

/// Small entity pool so duplicates and refinements actually occur.
fn entity_strategy() -> impl Strategy<Value = EntityRef> {
    prop_oneof![
        (0u8..6).prop_map(|n| EntityRef::grounded(format!("e{n}"), "ont", format!("e{n}"))),
        (0u8..3).prop_map(|n| EntityRef::named(format!("loose{n}"))),
    ]
}

fn content_strategy() -> impl Strategy<Value = AssertionContent> {
    prop_oneof![
        (
            prop_oneof![Just("binds"), Just("inhibits")],
            proptest::option::of(entity_strategy()),
            entity_strategy(),
            proptest::option::of(prop_oneof![Just("s1"), Just("s2")]),
        )
            .prop_map(|(predicate, subject, object, site)| AssertionContent::Relation {
                predicate: predicate.into(),
                subject,
                object,
                qualifiers: Qualifiers {
                    site: site.map(String::from),
                    condition: None,
                },
            }),
        proptest::collection::vec(entity_strategy(), 2..4)
            .prop_map(|members| AssertionContent::Association { members }),
    ]
}

fn corpus_strategy() -> impl Strategy<Value = Vec<AssertionContent>> {
    proptest::collection::vec(content_strategy(), 1..24)
}

fn records_from(contents: &[AssertionContent]) -> Vec<RawRecord> {
    contents
        .iter()
        .enumerate()
        .map(|(n, content)| RawRecord {
            id: RecordId::from_uuid(Uuid::from_u128(n as u128 + 1)),
            payload: serde_json::to_string(content).unwrap(),
            evidence: Evidence::new(format!("sentence {n}"), "reader-a", format!("doc:{n}")),
        })
        .collect()
}

fn ontology() -> Ontology {
    // e1..e5 all descend from e0; e3 also under e1.
    let mut ontology = Ontology::new();
    for n in 1..6 {
        ontology.add_is_a(format!("ont:e{n}"), "ont:e0");
    }
    ontology.add_is_a("ont:e3", "ont:e1");
    ontology
}

fn build(contents: &[AssertionContent], batch_size: usize) -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_raw_records(records_from(contents)).unwrap();
    let manager = CorpusManager::new(
        AssemblyConfig::default().with_batch_size(batch_size),
        Box::new(OntologyComparator::new(ontology())),
    );
    manager
        .create_corpus(&store, &store, &MemoryCheckpointStore::new(), false)
        .unwrap();
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// One canonical record per distinct matches key; every raw record
    /// linked to exactly the canonical record its content hashes to.
    #[test]
    fn dedup_partitions_the_corpus(contents in corpus_strategy()) {
        let store = build(&contents, 5);

        let mut expected: AHashSet<_> = AHashSet::new();
        for content in &contents {
            let mut normalized = content.clone();
            normalized.normalize().unwrap();
            expected.insert(normalized.shallow_hash());
        }
        prop_assert_eq!(store.known_hashes().unwrap(), expected.clone());

        // Coverage: evidence links partition the raw ids by content hash.
        let mut linked_total = 0usize;
        for hash in &expected {
            let evidence = store.evidence_for(*hash).unwrap();
            linked_total += evidence.len();
            for id in evidence {
                let index = (id.as_uuid().as_u128() - 1) as usize;
                let mut normalized = contents[index].clone();
                normalized.normalize().unwrap();
                prop_assert_eq!(normalized.shallow_hash(), *hash);
            }
        }
        prop_assert_eq!(linked_total, contents.len());
    }

    /// No self-links, no symmetric pairs, and links only between known
    /// canonical hashes.
    #[test]
    fn refinement_links_are_a_strict_partial_orientation(contents in corpus_strategy()) {
        let store = build(&contents, 5);
        let hashes = store.known_hashes().unwrap();
        let links = store.existing_refinement_links().unwrap();
        for link in &links {
            prop_assert_ne!(link.general, link.specific);
            prop_assert!(!links.contains(&link.mirror()));
            prop_assert!(hashes.contains(&link.general));
            prop_assert!(hashes.contains(&link.specific));
        }
    }

    /// Batch geometry never changes the outcome.
    #[test]
    fn batch_size_independence(contents in corpus_strategy()) {
        let reference = build(&contents, 10_000);
        for batch_size in [1usize, 7] {
            let store = build(&contents, batch_size);
            prop_assert_eq!(
                store.known_hashes().unwrap(),
                reference.known_hashes().unwrap()
            );
            prop_assert_eq!(
                store.existing_refinement_links().unwrap(),
                reference.existing_refinement_links().unwrap()
            );
        }
    }

    /// The default comparator honors its contract on distinct contents:
    /// irreflexive (distinct hashes) and never mutual.
    #[test]
    fn comparator_is_never_mutual(
        a in content_strategy(),
        b in content_strategy(),
    ) {
        let mut a = a;
        let mut b = b;
        a.normalize().unwrap();
        b.normalize().unwrap();
        prop_assume!(a.matches_key() != b.matches_key());
        let comparator = OntologyComparator::new(ontology());
        prop_assert!(!(comparator.refines(&a, &b) && comparator.refines(&b, &a)));
    }
}
