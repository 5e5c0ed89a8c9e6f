//! Assertion content: the closed set of shapes an extracted assertion can
//! take, plus payload decoding and normalization.
//!
//! Content carries no evidence; two raw records with the same content and
//! different evidence normalize to identical values and therefore identical
//! shallow hashes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Entities and qualifiers
// ============================================================================

/// Reference into an external ontology namespace, e.g. `("chebi", "15365")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grounding {
    pub namespace: String,
    pub id: String,
}

/// An entity argument of an assertion.
///
/// Grounded entities are identified by their ontology reference; ungrounded
/// ones fall back to their surface name. Two entities with different
/// groundings are distinct regardless of name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<Grounding>,
}

impl EntityRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grounding: None,
        }
    }

    pub fn grounded(name: impl Into<String>, namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grounding: Some(Grounding {
                namespace: namespace.into(),
                id: id.into(),
            }),
        }
    }

    /// Canonical key fragment for this entity, used for hashing and for the
    /// canonical ordering of association members.
    pub fn key(&self) -> String {
        match &self.grounding {
            Some(g) => format!("{}:{}", g.namespace, g.id),
            None => format!("~{}", self.name),
        }
    }
}

/// Optional detail qualifiers on an assertion.
///
/// An absent field means "unspecified", which is strictly more general than
/// any present value. Present fields participate in the matches key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Qualifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Qualifiers {
    pub fn is_empty(&self) -> bool {
        self.site.is_none() && self.condition.is_none()
    }

    pub(crate) fn key(&self) -> String {
        format!(
            "q({},{})",
            self.site.as_deref().unwrap_or("∅"),
            self.condition.as_deref().unwrap_or("∅"),
        )
    }
}

// ============================================================================
// Assertion content
// ============================================================================

/// The content of a single factual assertion.
///
/// This is a closed sum: fingerprinting and refinement comparison match on
/// it exhaustively, so adding a variant forces both to be revisited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssertionContent {
    /// Directed relation: subject --predicate--> object.
    ///
    /// The subject may be unspecified, which is the most general form of
    /// the relation (any concrete subject refines it).
    Relation {
        predicate: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<EntityRef>,
        object: EntityRef,
        #[serde(default, skip_serializing_if = "Qualifiers::is_empty")]
        qualifiers: Qualifiers,
    },
    /// A named attribute of one entity, optionally with a value.
    Attribute {
        subject: EntityRef,
        attribute: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Qualifiers::is_empty")]
        qualifiers: Qualifiers,
    },
    /// Undirected association between two or more entities.
    Association { members: Vec<EntityRef> },
}

// ============================================================================
// Normalization
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("entity name is empty")]
    EmptyEntityName,
    #[error("grounding namespace or id is empty")]
    EmptyGrounding,
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("association needs at least 2 members, found {0}")]
    TooFewMembers(usize),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("payload is not valid assertion JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload failed normalization: {0}")]
    Normalize(#[from] NormalizeError),
}

fn normalize_entity(entity: &mut EntityRef) -> Result<(), NormalizeError> {
    entity.name = entity.name.trim().to_string();
    if entity.name.is_empty() {
        return Err(NormalizeError::EmptyEntityName);
    }
    if let Some(grounding) = &mut entity.grounding {
        grounding.namespace = grounding.namespace.trim().to_string();
        grounding.id = grounding.id.trim().to_string();
        if grounding.namespace.is_empty() || grounding.id.is_empty() {
            return Err(NormalizeError::EmptyGrounding);
        }
    }
    Ok(())
}

fn normalize_opt(field: &mut Option<String>) {
    if let Some(value) = field {
        *value = value.trim().to_string();
        if value.is_empty() {
            *field = None;
        }
    }
}

impl AssertionContent {
    /// Decode a serialized payload and normalize it.
    pub fn from_payload(payload: &str) -> Result<Self, ParseError> {
        let mut content: AssertionContent = serde_json::from_str(payload)?;
        content.normalize()?;
        Ok(content)
    }

    /// Bring content into canonical form.
    ///
    /// Trims all text, drops empty optional fields, and sorts association
    /// members by their entity key so the shallow hash is independent of
    /// record-internal ordering.
    pub fn normalize(&mut self) -> Result<(), NormalizeError> {
        match self {
            AssertionContent::Relation {
                predicate,
                subject,
                object,
                qualifiers,
            } => {
                *predicate = predicate.trim().to_string();
                if predicate.is_empty() {
                    return Err(NormalizeError::EmptyField("predicate"));
                }
                if let Some(subject) = subject {
                    normalize_entity(subject)?;
                }
                normalize_entity(object)?;
                normalize_opt(&mut qualifiers.site);
                normalize_opt(&mut qualifiers.condition);
            }
            AssertionContent::Attribute {
                subject,
                attribute,
                value,
                qualifiers,
            } => {
                normalize_entity(subject)?;
                *attribute = attribute.trim().to_string();
                if attribute.is_empty() {
                    return Err(NormalizeError::EmptyField("attribute"));
                }
                normalize_opt(value);
                normalize_opt(&mut qualifiers.site);
                normalize_opt(&mut qualifiers.condition);
            }
            AssertionContent::Association { members } => {
                if members.len() < 2 {
                    return Err(NormalizeError::TooFewMembers(members.len()));
                }
                for member in members.iter_mut() {
                    normalize_entity(member)?;
                }
                members.sort_by(|a, b| a.key().cmp(&b.key()));
            }
        }
        Ok(())
    }
}
