//! Mutation events reported by the host.
//!
//! The host calls the invalidation hooks whenever its data changes. Saving
//! one post typically fires several hooks for the same entity, so events are
//! collected into a [`MutationBatch`] and deduplicated before any cache work
//! is done.
//!
//! ```text
//! host save hooks ──► MutationEvent ──► MutationBatch ──► UsageService::apply
//! ```

use std::time::Instant;

use mu_core::{EntityKey, ResourceId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Something in the host changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationEvent {
    /// A tracked resource was edited or deleted.
    Resource(ResourceId),
    /// A referencing entity (post, setting, term) was edited or deleted.
    Entity(EntityKey),
}

/// A batch of mutation events received together.
///
/// Uses [`SmallVec`] with inline storage for up to 8 events, which covers
/// the burst produced by a single save.
///
/// # Examples
///
/// ```
/// use mu_core::{EntityId, EntityKey, ResourceId};
/// use mu_scanner::{MutationBatch, MutationEvent};
///
/// let mut batch = MutationBatch::new();
/// batch.push(MutationEvent::Entity(EntityKey::Entity(EntityId(3))));
/// batch.push(MutationEvent::Entity(EntityKey::Entity(EntityId(3))));
/// batch.push(MutationEvent::Resource(ResourceId::new(9).unwrap()));
///
/// assert_eq!(batch.len(), 3);
/// assert_eq!(batch.unique_entities().len(), 1);
/// assert_eq!(batch.stats().duplicates, 1);
/// ```
#[derive(Debug, Clone)]
pub struct MutationBatch {
    /// The events in arrival order.
    pub events: SmallVec<[MutationEvent; 8]>,

    /// When the batch was created.
    pub received_at: Instant,
}

impl MutationBatch {
    /// Creates a new empty batch.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: SmallVec::new(),
            received_at: Instant::now(),
        }
    }

    /// Creates a batch from events.
    #[must_use]
    pub fn from_events(events: impl IntoIterator<Item = MutationEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            received_at: Instant::now(),
        }
    }

    /// Adds an event to the batch.
    #[inline]
    pub fn push(&mut self, event: MutationEvent) {
        self.events.push(event);
    }

    /// Returns the number of events, duplicates included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if the batch contains no events.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Distinct resources, sorted.
    #[must_use]
    pub fn unique_resources(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self
            .events
            .iter()
            .filter_map(|e| match e {
                MutationEvent::Resource(id) => Some(*id),
                MutationEvent::Entity(_) => None,
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Distinct entities, sorted.
    #[must_use]
    pub fn unique_entities(&self) -> Vec<&EntityKey> {
        let mut keys: Vec<&EntityKey> = self
            .events
            .iter()
            .filter_map(|e| match e {
                MutationEvent::Entity(key) => Some(key),
                MutationEvent::Resource(_) => None,
            })
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Summary of the batch.
    #[must_use]
    pub fn stats(&self) -> MutationBatchStats {
        let resources = self.unique_resources().len();
        let entities = self.unique_entities().len();
        MutationBatchStats {
            total_events: self.len(),
            resources,
            entities,
            duplicates: self.len() - resources - entities,
        }
    }
}

impl Default for MutationBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<MutationEvent> for MutationBatch {
    fn from_iter<T: IntoIterator<Item = MutationEvent>>(iter: T) -> Self {
        Self::from_events(iter)
    }
}

/// Summary statistics for a [`MutationBatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationBatchStats {
    /// Events received.
    pub total_events: usize,
    /// Distinct resources.
    pub resources: usize,
    /// Distinct entities.
    pub entities: usize,
    /// Events dropped as repeats.
    pub duplicates: usize,
}
