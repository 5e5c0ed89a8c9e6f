//! Content fingerprinting.
//!
//! Two fingerprints are derived from SHA-256 over a canonical matches key:
//!
//! - [`ShallowHash`]: content only, 14 hex digits centered on zero so it
//!   fits a signed 64-bit column. This is the canonical-record identity.
//!   At 10^8 distinct contents the collision odds are on the order of
//!   10^-9; collisions can always be arbitrated with the matches key.
//! - [`FullHash`]: content plus the sorted evidence fingerprints, 32 hex
//!   digits in a signed 128-bit value. Extraction counts exceed content
//!   counts by orders of magnitude, hence the wider value. Exposed for
//!   external consumers; dedup and refinement never use it.
//!
//! Both are stable across runs, processes, and machines.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::content::AssertionContent;
use crate::evidence::Evidence;

// ============================================================================
// Hash newtypes
// ============================================================================

/// Content-only fingerprint; identity of a canonical record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ShallowHash(pub i64);

impl std::fmt::Display for ShallowHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Content + evidence fingerprint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct FullHash(pub i128);

impl std::fmt::Display for FullHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Truncated signed digests
// ============================================================================

/// First 56 bits of SHA-256, centered on zero.
fn signed_56(input: &str) -> i64 {
    let digest = Sha256::digest(input.as_bytes());
    let mut raw: u64 = 0;
    for byte in &digest[..7] {
        raw = (raw << 8) | u64::from(*byte);
    }
    raw as i64 - (1i64 << 55)
}

/// First 64 bits of SHA-256 as a signed value.
fn signed_64(input: &str) -> i64 {
    let digest = Sha256::digest(input.as_bytes());
    let mut raw: u64 = 0;
    for byte in &digest[..8] {
        raw = (raw << 8) | u64::from(*byte);
    }
    raw as i64
}

/// First 128 bits of SHA-256, centered on zero.
fn signed_128(input: &str) -> i128 {
    let digest = Sha256::digest(input.as_bytes());
    let mut raw: u128 = 0;
    for byte in &digest[..16] {
        raw = (raw << 8) | u128::from(*byte);
    }
    raw.wrapping_sub(1u128 << 127) as i128
}

pub(crate) fn evidence_fingerprint(evidence: &Evidence) -> i64 {
    signed_64(&evidence.matches_key())
}

// ============================================================================
// Matches keys and hashes
// ============================================================================

impl AssertionContent {
    /// Canonical matches key: equal for exactly the contents that should
    /// deduplicate to one canonical record.
    ///
    /// Built by exhaustive match; association members are already in
    /// canonical order after normalization.
    pub fn matches_key(&self) -> String {
        match self {
            AssertionContent::Relation {
                predicate,
                subject,
                object,
                qualifiers,
            } => {
                let subject_key = subject.as_ref().map(|s| s.key());
                format!(
                    "rel({};{};{};{})",
                    predicate,
                    subject_key.as_deref().unwrap_or("∅"),
                    object.key(),
                    qualifiers.key(),
                )
            }
            AssertionContent::Attribute {
                subject,
                attribute,
                value,
                qualifiers,
            } => format!(
                "attr({};{};{};{})",
                subject.key(),
                attribute,
                value.as_deref().unwrap_or("∅"),
                qualifiers.key(),
            ),
            AssertionContent::Association { members } => {
                let keys: Vec<String> = members.iter().map(|m| m.key()).collect();
                format!("assoc({})", keys.join(","))
            }
        }
    }

    /// Content-only hash used for deduplication.
    pub fn shallow_hash(&self) -> ShallowHash {
        ShallowHash(signed_56(&self.matches_key()))
    }

    /// Content + evidence hash, exposed to external consumers.
    pub fn full_hash(&self, evidence: &[Evidence]) -> FullHash {
        let mut prints: Vec<i64> = evidence.iter().map(Evidence::fingerprint).collect();
        prints.sort_unstable();
        let mut key = self.matches_key();
        for print in prints {
            key.push(';');
            key.push_str(&print.to_string());
        }
        FullHash(signed_128(&key))
    }
}
