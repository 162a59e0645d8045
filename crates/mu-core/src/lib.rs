//! Core types, storage capabilities, and configuration for media usage tracking.
//!
//! This crate provides the foundational pieces shared across the workspace:
//!
//! - Domain types ([`ResourceId`], [`Reference`], [`UsageRecord`], [`ProgressState`])
//! - The five lookup capabilities the reference scanner consumes ([`source`])
//! - A typed key/value store abstraction for persisted state ([`store`])
//! - An in-memory content store usable as a fixture ([`site`])
//! - Configuration structures ([`Config`])
//!
//! # Crate Dependencies
//!
//! ```text
//! mu-cli ──► mu-jobs ──► mu-scanner ──► mu-core
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod site;
pub mod source;
pub mod store;
pub mod types;

pub use config::{Config, JobConfig, ScanConfig};
pub use error::{ConfigError, LookupError, StoreError};
pub use site::{EntityEntry, MemoryContentStore, ResourceEntry, SiteSnapshot, TermEntry};
pub use source::{
    AttributeLookup, AttributeMatch, ContentSources, EntityDirectory, EntityMatch,
    ForwardReferenceLookup, PrimaryReferenceLookup, ResourceCatalog, SettingsLookup,
    TaxonomyLookup, TermInfo, TextSearchLookup, contains_substring,
};
pub use store::{FileKvStore, KeyValueStore, KeyValueStoreExt, MemoryKvStore};
pub use types::{
    EntityId, EntityKey, JobQueueEntry, JobState, ProgressState, Reference, ReferenceKind,
    ResourceId, TermId, UsageRecord,
};
