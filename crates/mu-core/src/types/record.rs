//! Cached usage records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ResourceId;
use super::reference::{EntityKey, Reference};

/// The cached result of scanning one resource.
///
/// A record exists for a resource if and only if the resource has been
/// scanned since its last invalidation. Absence means "not yet scanned",
/// never "unused".
///
/// # Examples
///
/// ```
/// use mu_core::{EntityId, EntityKey, Reference, ResourceId, UsageRecord};
///
/// let id = ResourceId::new(10).unwrap();
/// let record = UsageRecord::new(id, vec![Reference::featured(EntityId(3), "Home", None)]);
///
/// assert!(record.is_used());
/// assert!(record.references_entity(&EntityKey::Entity(EntityId(3))));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// The scanned resource.
    pub resource_id: ResourceId,

    /// References in discovery order across phases.
    pub references: Vec<Reference>,

    /// When the scan completed.
    pub computed_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(resource_id: ResourceId, references: Vec<Reference>) -> Self {
        Self {
            resource_id,
            references,
            computed_at: Utc::now(),
        }
    }

    /// Returns `true` if at least one reference was found.
    #[inline]
    #[must_use]
    pub fn is_used(&self) -> bool {
        !self.references.is_empty()
    }

    /// Returns `true` if the given entity is among the references.
    #[must_use]
    pub fn references_entity(&self, key: &EntityKey) -> bool {
        self.references.iter().any(|r| &r.entity == key)
    }

    /// Iterates over the distinct entities cited by this record.
    pub fn entities(&self) -> impl Iterator<Item = &EntityKey> {
        self.references.iter().map(|r| &r.entity)
    }
}
