//! Order-preserving reference deduplication.

use mu_core::{EntityKey, Reference};
use rustc_hash::FxHashSet;

/// Accumulates references across phases, keeping the first one seen for
/// each [`EntityKey`].
///
/// Phases run in order, so the earliest phase's label wins.
///
/// # Examples
///
/// ```
/// use mu_core::{EntityId, Reference};
/// use mu_scanner::ReferenceCollector;
///
/// let mut collector = ReferenceCollector::new();
/// assert!(collector.push(Reference::featured(EntityId(1), "Home", None)));
/// assert!(!collector.push(Reference::attribute_match(EntityId(1), "Home", Some("publish"), None)));
///
/// let references = collector.into_references();
/// assert_eq!(references.len(), 1);
/// assert_eq!(references[0].label, "Home");
/// ```
#[derive(Debug, Default)]
pub struct ReferenceCollector {
    seen: FxHashSet<EntityKey>,
    references: Vec<Reference>,
}

impl ReferenceCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reference unless its entity was already recorded.
    ///
    /// Returns `true` if the reference was added.
    pub fn push(&mut self, reference: Reference) -> bool {
        if self.seen.contains(&reference.entity) {
            return false;
        }
        self.seen.insert(reference.entity.clone());
        self.references.push(reference);
        true
    }

    /// Adds every reference in order. Returns how many were new.
    pub fn extend(&mut self, references: impl IntoIterator<Item = Reference>) -> usize {
        let mut added = 0;
        for reference in references {
            if self.push(reference) {
                added += 1;
            }
        }
        added
    }

    /// Number of distinct references collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// Returns `true` if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Consumes the collector, returning references in discovery order.
    #[must_use]
    pub fn into_references(self) -> Vec<Reference> {
        self.references
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mu_core::{EntityId, TermId};

    #[test]
    fn test_dedup_keeps_discovery_order() {
        let mut collector = ReferenceCollector::new();
        let added = collector.extend([
            Reference::content_embed(EntityId(2), "B", None),
            Reference::content_embed(EntityId(1), "A", None),
            Reference::attribute_match(EntityId(2), "B", Some("draft"), None),
            Reference::global_setting("logo"),
            Reference::global_setting("logo"),
        ]);
        assert_eq!(added, 3);

        let labels: Vec<_> = collector.into_references().into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["B", "A", "Option name: logo"]);
    }

    #[test]
    fn test_buckets_are_independent() {
        let mut collector = ReferenceCollector::new();
        assert!(collector.push(Reference::content_embed(EntityId(5), "Post", None)));
        assert!(collector.push(Reference::taxonomy_term(TermId(5), "Tag", None)));
        assert_eq!(collector.len(), 2);
        assert!(!collector.is_empty());
    }
}
