//! Error types for the mu-core crate.
//!
//! - [`ConfigError`] covers configuration loading and validation.
//! - [`StoreError`] covers the persisted key/value store.
//! - [`LookupError`] covers the content collections the scanner queries.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use mu_core::ConfigError;
///
/// let error = ConfigError::invalid_option("chunk_size", "must be positive");
/// assert!(error.to_string().contains("chunk_size"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration {path}: {source}")]
    Io {
        /// The configuration file that could not be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by a [`KeyValueStore`](crate::KeyValueStore).
///
/// Only single-key atomicity is assumed of the backing store, so every
/// error refers to at most one key.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Reading or writing the backing file failed.
    #[error("store I/O error on {path}: {source}")]
    Io {
        /// The file backing the store.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A stored value could not be decoded.
    #[error("corrupt value under key '{key}': {source}")]
    Corrupt {
        /// The key holding the malformed value.
        key: String,
        /// The decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for storage.
    #[error("failed to encode value for key '{key}': {source}")]
    Encode {
        /// The key being written.
        key: String,
        /// The encoding error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Creates a new [`StoreError::Unavailable`] error.
    #[inline]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Creates a new [`StoreError::Io`] error.
    #[inline]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`StoreError::Corrupt`] error.
    #[inline]
    pub fn corrupt(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            key: key.into(),
            source,
        }
    }

    /// Returns `true` if the stored data itself is malformed.
    ///
    /// Corruption is recoverable: callers drop the value and start over.
    /// Every other variant means the store cannot currently be used.
    #[inline]
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// A content collection could not be queried.
///
/// The scanner degrades the affected phase to an empty result rather than
/// failing the scan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{collection} lookup unavailable: {reason}")]
pub struct LookupError {
    /// The collection that failed (e.g. `"attributes"`).
    pub collection: &'static str,
    /// Human-readable cause.
    pub reason: String,
}

impl LookupError {
    /// Creates a new [`LookupError`].
    #[inline]
    pub fn unavailable(collection: &'static str, reason: impl Into<String>) -> Self {
        Self {
            collection,
            reason: reason.into(),
        }
    }
}
