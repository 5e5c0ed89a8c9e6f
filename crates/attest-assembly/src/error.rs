//! Assembly error types.

use attest_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssemblyError {
    /// A self-refinement, a mutually refining pair, or a symmetric
    /// duplicate link. These indicate a fingerprinting or comparator
    /// defect; silently correcting them would corrupt the corpus, so they
    /// are never retried.
    #[error("internal consistency violation: {0}")]
    Consistency(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("checkpoint state unusable: {0}")]
    Checkpoint(String),
}

impl AssemblyError {
    /// Fatal errors abort the run immediately; everything else may be
    /// retried within the configured bounds.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AssemblyError::Consistency(_)
                | AssemblyError::Store(StoreError::Consistency(_))
                | AssemblyError::Store(StoreError::Codec(_))
                | AssemblyError::Checkpoint(_)
        )
    }
}
