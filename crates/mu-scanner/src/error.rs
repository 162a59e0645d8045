//! Error types for the mu-scanner crate.

use mu_core::{LookupError, ReferenceKind, StoreError};

/// Errors that can occur while scanning or maintaining the usage cache.
///
/// # Error Recovery Strategy
///
/// - **Lookup errors** ([`ScanError::Lookup`]): the phase is degraded to an
///   empty result, the scan continues and its result is not cached
/// - **Corrupt records** ([`ScanError::Store`] with corruption): the record
///   is dropped and the resource rescanned
/// - **Store unavailable**: fatal, surfaced to the caller
///
/// # Examples
///
/// ```
/// use mu_core::{LookupError, ReferenceKind};
/// use mu_scanner::ScanError;
///
/// let err = ScanError::lookup(ReferenceKind::GlobalSetting, LookupError::unavailable("settings", "down"));
/// assert!(err.is_recoverable());
/// assert_eq!(err.phase(), Some(ReferenceKind::GlobalSetting));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A lookup phase failed.
    #[error("{phase} phase failed: {source}")]
    Lookup {
        /// The failing phase.
        phase: ReferenceKind,
        /// The underlying lookup error.
        #[source]
        source: LookupError,
    },

    /// The key/value store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScanError {
    /// Creates a new [`ScanError::Lookup`] error.
    #[inline]
    pub fn lookup(phase: ReferenceKind, source: LookupError) -> Self {
        Self::Lookup { phase, source }
    }

    /// Returns `true` if the scan can continue after this error.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Lookup { .. } => true,
            Self::Store(err) => err.is_corruption(),
        }
    }

    /// Returns `true` if the operation must stop.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the lookup phase associated with this error, if any.
    #[must_use]
    pub const fn phase(&self) -> Option<ReferenceKind> {
        match self {
            Self::Lookup { phase, .. } => Some(*phase),
            Self::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_is_fatal() {
        let err = ScanError::from(StoreError::unavailable("down"));
        assert!(err.is_fatal());
        assert_eq!(err.phase(), None);
        assert_eq!(err.to_string(), "store unavailable: down");
    }

    #[test]
    fn test_lookup_display() {
        let err = ScanError::lookup(
            ReferenceKind::AttributeMatch,
            LookupError::unavailable("attributes", "timeout"),
        );
        assert_eq!(
            err.to_string(),
            "attribute_match phase failed: attributes lookup unavailable: timeout"
        );
    }
}
