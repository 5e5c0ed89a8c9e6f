//! Attest Content Model
//!
//! The types that flow through corpus assembly:
//!
//! - [`RawRecord`]: one extracted assertion plus exactly one piece of
//!   evidence, as delivered by an upstream extractor. Immutable once
//!   ingested, identified by a [`RecordId`].
//! - [`AssertionContent`]: the assertion itself, a closed sum type matched
//!   exhaustively by fingerprinting and comparison logic.
//! - [`Evidence`]: the text/source/locator triple backing a raw record.
//! - Fingerprints: [`ShallowHash`] (content only, the canonical identity)
//!   and [`FullHash`] (content + evidence, exposed for external consumers).
//!
//! Source-format parsing is out of scope; payloads arrive here already
//! serialized as JSON and are decoded and normalized by this crate.

pub mod content;
pub mod evidence;
pub mod fingerprint;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use content::{
    AssertionContent, EntityRef, Grounding, NormalizeError, ParseError, Qualifiers,
};
pub use evidence::Evidence;
pub use fingerprint::{FullHash, ShallowHash};

// ============================================================================
// Raw Records
// ============================================================================

/// Unique identifier of a raw record, assigned at ingestion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One extracted assertion with its single piece of evidence.
///
/// The payload is the serialized [`AssertionContent`]; it is decoded lazily
/// during deduplication so a malformed record can be skipped without
/// aborting its batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: RecordId,
    pub payload: String,
    pub evidence: Evidence,
}

impl RawRecord {
    pub fn new(payload: impl Into<String>, evidence: Evidence) -> Self {
        Self {
            id: RecordId::new(),
            payload: payload.into(),
            evidence,
        }
    }

    /// Decode and normalize the payload into assertion content.
    pub fn decode(&self) -> Result<AssertionContent, ParseError> {
        AssertionContent::from_payload(&self.payload)
    }
}
