//! Evidence: the text/source/locator triple attached to each raw record.

use serde::{Deserialize, Serialize};

use crate::fingerprint;

/// One piece of evidence supporting an assertion.
///
/// `source` names the upstream collection (a reader, a database), `locator`
/// points into it (a DOI, an accession, a file offset).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Evidence {
    pub text: String,
    pub source: String,
    pub locator: String,
}

impl Evidence {
    pub fn new(
        text: impl Into<String>,
        source: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            locator: locator.into(),
        }
    }

    /// Deterministic fingerprint of this evidence item.
    ///
    /// Feeds the full hash; dedup and refinement never look at it.
    pub fn fingerprint(&self) -> i64 {
        fingerprint::evidence_fingerprint(self)
    }

    pub(crate) fn matches_key(&self) -> String {
        format!("ev({};{};{})", self.text, self.source, self.locator)
    }
}
