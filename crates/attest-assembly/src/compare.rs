//! Refinement comparison.
//!
//! The scanner consumes refinement purely as a boolean decision function
//! over ordered pairs of assertion content ([`RefinementComparator`]).
//! [`OntologyComparator`] is the default implementation: entity arguments
//! are checked against an in-memory is-a [`Ontology`], structure must
//! match variant-for-variant, and the specific side must carry at least as
//! much qualifier detail as the general side.

use ahash::{AHashMap, AHashSet};
use attest_model::{AssertionContent, EntityRef};
use serde::Deserialize;

use crate::error::AssemblyError;

/// Decides whether one assertion is a more specific instance of another.
///
/// Callers only ever present pairs of distinct canonical records (distinct
/// matches keys). For such pairs, `refines(a, b)` and `refines(b, a)` must
/// never both be true; the scanner treats a violation as fatal.
/// Implementations are pure in-memory computations; they must never block
/// on I/O.
pub trait RefinementComparator: Send + Sync {
    /// Does `specific` refine `general`?
    fn refines(&self, specific: &AssertionContent, general: &AssertionContent) -> bool;
}

// ============================================================================
// Ontology
// ============================================================================

/// In-memory is-a relation over entity keys (see [`EntityRef::key`]).
///
/// Holds direct parent edges; ancestry is resolved by walking upward with a
/// cycle guard, so a malformed ontology cannot hang a comparison.
#[derive(Debug, Default, Clone)]
pub struct Ontology {
    parents: AHashMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct IsAEdge {
    child: String,
    parent: String,
}

#[derive(Deserialize)]
struct OntologyFile {
    is_a: Vec<IsAEdge>,
}

impl Ontology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `child` is-a `parent`, both as entity keys.
    pub fn add_is_a(&mut self, child: impl Into<String>, parent: impl Into<String>) {
        self.parents
            .entry(child.into())
            .or_default()
            .push(parent.into());
    }

    /// Load from the JSON form `{"is_a": [{"child": "...", "parent": "..."}]}`.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let file: OntologyFile = serde_json::from_str(json)?;
        let mut ontology = Self::new();
        for edge in file.is_a {
            ontology.add_is_a(edge.child, edge.parent);
        }
        Ok(ontology)
    }

    /// Is `child` a (transitive) descendant of `ancestor`? Strict: a key
    /// does not descend from itself.
    pub fn descends_from(&self, child: &str, ancestor: &str) -> bool {
        let mut visited: AHashSet<&str> = AHashSet::new();
        let mut stack: Vec<&str> = vec![child];
        while let Some(key) = stack.pop() {
            if !visited.insert(key) {
                continue;
            }
            if let Some(parents) = self.parents.get(key) {
                for parent in parents {
                    if parent == ancestor {
                        return true;
                    }
                    stack.push(parent);
                }
            }
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

// ============================================================================
// Default comparator
// ============================================================================

/// Ontology-backed refinement over the closed content variants.
pub struct OntologyComparator {
    ontology: Ontology,
}

impl OntologyComparator {
    pub fn new(ontology: Ontology) -> Self {
        Self { ontology }
    }

    /// Comparator with an empty ontology: only exact entity matches count.
    pub fn exact() -> Self {
        Self::new(Ontology::new())
    }

    /// `specific` names the same entity as `general`, or a descendant of it.
    fn entity_refines(&self, specific: &EntityRef, general: &EntityRef) -> bool {
        let specific_key = specific.key();
        let general_key = general.key();
        specific_key == general_key || self.ontology.descends_from(&specific_key, &general_key)
    }

    /// An unspecified general field admits anything; a present one must be
    /// matched exactly.
    fn detail_refines(specific: &Option<String>, general: &Option<String>) -> bool {
        match general {
            None => true,
            Some(value) => specific.as_deref() == Some(value),
        }
    }

    /// Injective assignment of specific members onto general members, each
    /// refining its target. Arities are small, so plain backtracking.
    fn members_refine(&self, specific: &[EntityRef], general: &[EntityRef]) -> bool {
        if specific.len() != general.len() {
            return false;
        }
        let mut used = vec![false; specific.len()];
        self.assign_members(specific, general, 0, &mut used)
    }

    fn assign_members(
        &self,
        specific: &[EntityRef],
        general: &[EntityRef],
        target: usize,
        used: &mut [bool],
    ) -> bool {
        if target == general.len() {
            return true;
        }
        for (idx, member) in specific.iter().enumerate() {
            if used[idx] || !self.entity_refines(member, &general[target]) {
                continue;
            }
            used[idx] = true;
            if self.assign_members(specific, general, target + 1, used) {
                return true;
            }
            used[idx] = false;
        }
        false
    }
}

impl RefinementComparator for OntologyComparator {
    fn refines(&self, specific: &AssertionContent, general: &AssertionContent) -> bool {
        match (specific, general) {
            (
                AssertionContent::Relation {
                    predicate: s_pred,
                    subject: s_subj,
                    object: s_obj,
                    qualifiers: s_qual,
                },
                AssertionContent::Relation {
                    predicate: g_pred,
                    subject: g_subj,
                    object: g_obj,
                    qualifiers: g_qual,
                },
            ) => {
                if s_pred != g_pred {
                    return false;
                }
                // An absent general subject is the most general form; an
                // absent specific subject never refines a present one.
                let subject_ok = match (s_subj, g_subj) {
                    (_, None) => true,
                    (None, Some(_)) => false,
                    (Some(s), Some(g)) => self.entity_refines(s, g),
                };
                subject_ok
                    && self.entity_refines(s_obj, g_obj)
                    && Self::detail_refines(&s_qual.site, &g_qual.site)
                    && Self::detail_refines(&s_qual.condition, &g_qual.condition)
            }
            (
                AssertionContent::Attribute {
                    subject: s_subj,
                    attribute: s_attr,
                    value: s_value,
                    qualifiers: s_qual,
                },
                AssertionContent::Attribute {
                    subject: g_subj,
                    attribute: g_attr,
                    value: g_value,
                    qualifiers: g_qual,
                },
            ) => {
                s_attr == g_attr
                    && self.entity_refines(s_subj, g_subj)
                    && Self::detail_refines(s_value, g_value)
                    && Self::detail_refines(&s_qual.site, &g_qual.site)
                    && Self::detail_refines(&s_qual.condition, &g_qual.condition)
            }
            (
                AssertionContent::Association { members: s_members },
                AssertionContent::Association { members: g_members },
            ) => self.members_refine(s_members, g_members),
            // Different shapes never refine each other.
            _ => false,
        }
    }
}

/// Probe an ordered pair in both directions.
///
/// Returns the refinement direction if any; mutual refinement is the
/// comparator breaking its contract and is reported as fatal.
pub(crate) fn probe_pair(
    comparator: &dyn RefinementComparator,
    a: &AssertionContent,
    b: &AssertionContent,
) -> Result<Option<Direction>, AssemblyError> {
    let a_refines_b = comparator.refines(a, b);
    let b_refines_a = comparator.refines(b, a);
    match (a_refines_b, b_refines_a) {
        (true, true) => Err(AssemblyError::Consistency(format!(
            "comparator reports mutual refinement between hashes {} and {}",
            a.shallow_hash(),
            b.shallow_hash()
        ))),
        (true, false) => Ok(Some(Direction::FirstRefinesSecond)),
        (false, true) => Ok(Some(Direction::SecondRefinesFirst)),
        (false, false) => Ok(None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    FirstRefinesSecond,
    SecondRefinesFirst,
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_model::Qualifiers;

    fn relation(subject: Option<EntityRef>, site: Option<&str>) -> AssertionContent {
        AssertionContent::Relation {
            predicate: "inhibits".into(),
            subject,
            object: EntityRef::grounded("COX1", "gene", "cox1"),
            qualifiers: Qualifiers {
                site: site.map(String::from),
                condition: None,
            },
        }
    }

    fn ontology() -> Ontology {
        let mut ontology = Ontology::new();
        ontology.add_is_a("chebi:aspirin", "chebi:nsaid");
        ontology.add_is_a("chebi:nsaid", "chebi:drug");
        ontology
    }

    #[test]
    fn descendant_subject_refines_ancestor() {
        let comparator = OntologyComparator::new(ontology());
        let general = relation(Some(EntityRef::grounded("NSAID", "chebi", "nsaid")), None);
        let specific = relation(Some(EntityRef::grounded("aspirin", "chebi", "aspirin")), None);
        assert!(comparator.refines(&specific, &general));
        assert!(!comparator.refines(&general, &specific));
    }

    #[test]
    fn transitive_ancestry_is_honored() {
        let comparator = OntologyComparator::new(ontology());
        let general = relation(Some(EntityRef::grounded("drug", "chebi", "drug")), None);
        let specific = relation(Some(EntityRef::grounded("aspirin", "chebi", "aspirin")), None);
        assert!(comparator.refines(&specific, &general));
    }

    #[test]
    fn present_subject_refines_absent_one() {
        let comparator = OntologyComparator::exact();
        let general = relation(None, None);
        let specific = relation(Some(EntityRef::named("anything")), None);
        assert!(comparator.refines(&specific, &general));
        assert!(!comparator.refines(&general, &specific));
    }

    #[test]
    fn qualifier_detail_must_be_kept() {
        let comparator = OntologyComparator::exact();
        let general = relation(Some(EntityRef::named("a")), None);
        let detailed = relation(Some(EntityRef::named("a")), Some("ser-530"));
        assert!(comparator.refines(&detailed, &general));
        assert!(!comparator.refines(&general, &detailed));

        let other_site = relation(Some(EntityRef::named("a")), Some("tyr-385"));
        assert!(!comparator.refines(&other_site, &detailed));
    }

    #[test]
    fn associations_match_members_injectively() {
        let comparator = OntologyComparator::new(ontology());
        let general = AssertionContent::Association {
            members: vec![
                EntityRef::grounded("NSAID", "chebi", "nsaid"),
                EntityRef::named("COX1"),
            ],
        };
        let specific = AssertionContent::Association {
            members: vec![
                EntityRef::named("COX1"),
                EntityRef::grounded("aspirin", "chebi", "aspirin"),
            ],
        };
        assert!(comparator.refines(&specific, &general));

        let wrong_arity = AssertionContent::Association {
            members: vec![EntityRef::named("COX1")],
        };
        assert!(!comparator.refines(&wrong_arity, &general));
    }

    #[test]
    fn variant_mismatch_never_refines() {
        let comparator = OntologyComparator::exact();
        let relation = relation(Some(EntityRef::named("a")), None);
        let association = AssertionContent::Association {
            members: vec![EntityRef::named("a"), EntityRef::named("b")],
        };
        assert!(!comparator.refines(&relation, &association));
        assert!(!comparator.refines(&association, &relation));
    }

    #[test]
    fn cyclic_ontology_cannot_hang() {
        let mut ontology = Ontology::new();
        ontology.add_is_a("a", "b");
        ontology.add_is_a("b", "a");
        assert!(ontology.descends_from("a", "b"));
        assert!(!ontology.descends_from("a", "missing"));
    }
}
