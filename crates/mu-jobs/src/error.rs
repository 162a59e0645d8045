//! Error types for the mu-jobs crate.

use mu_core::{LookupError, StoreError};
use mu_scanner::ScanError;

/// Errors that can occur while dispatching or running a batch job.
///
/// Missing or malformed data is never an error here: an unreadable queue is
/// treated as empty and invalid resource ids are filtered. What remains are
/// failures of the store or the resource catalog, which the caller must see.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The key/value store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A scan failed in a way that cannot be degraded.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Resources could not be enumerated.
    #[error("failed to enumerate resources: {0}")]
    Catalog(#[from] LookupError),

    /// The worker task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl JobError {
    /// Returns `true` if retrying the same call later may succeed.
    ///
    /// Store outages and catalog failures are transient; a crashed worker is
    /// not. Scan errors keep their own classification.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(_) | Self::Catalog(_) => true,
            Self::Scan(err) => err.is_recoverable(),
            Self::Worker(_) => false,
        }
    }

    /// Returns `true` if the error is not recoverable.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_is_transparent() {
        let err = JobError::from(StoreError::unavailable("offline"));
        assert_eq!(err.to_string(), "store unavailable: offline");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_scan_error_keeps_its_classification() {
        let fatal = JobError::from(ScanError::Store(StoreError::unavailable("offline")));
        assert!(fatal.is_fatal());

        let recoverable = JobError::from(ScanError::lookup(
            mu_core::ReferenceKind::TaxonomyTerm,
            LookupError::unavailable("terms", "timeout"),
        ));
        assert!(recoverable.is_recoverable());
    }

    #[test]
    fn test_catalog_error_display() {
        let err = JobError::from(LookupError::unavailable("resources", "timeout"));
        assert_eq!(
            err.to_string(),
            "failed to enumerate resources: resources lookup unavailable: timeout"
        );
    }
}
