//! Domain types for media usage tracking.
//!
//! # Module Organization
//!
//! - [`ids`] - Resource, entity, and term identifiers
//! - [`reference`] - References and the deduplication key
//! - [`record`] - Cached usage records
//! - [`job`] - Queue entries, progress counters, and job state
//!
//! All public types are re-exported at this module level and at the crate root:
//!
//! ```
//! use mu_core::{ResourceId, Reference, UsageRecord, ProgressState};
//! ```

mod ids;
mod job;
mod record;
mod reference;

pub use ids::{EntityId, ResourceId, TermId};
pub use job::{JobQueueEntry, JobState, ProgressState};
pub use record::UsageRecord;
pub use reference::{EntityKey, Reference, ReferenceKind};
