//! Identifier newtypes.
//!
//! Resources, entities, and taxonomy terms live in separate id spaces in the
//! host content store. Keeping them as distinct types prevents a term id from
//! being passed where an entity id is expected.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

/// Identifier of a tracked resource (e.g. a media attachment).
///
/// Resource ids are always positive. Zero, negative, and malformed input is
/// rejected at construction, so every `ResourceId` in the system is valid.
///
/// # Examples
///
/// ```
/// use mu_core::ResourceId;
///
/// assert_eq!(ResourceId::new(42).map(ResourceId::get), Some(42));
/// assert!(ResourceId::new(0).is_none());
/// assert!(ResourceId::from_raw(-3).is_none());
/// assert_eq!(ResourceId::parse(" 17 ").map(ResourceId::get), Some(17));
/// assert!(ResourceId::parse("abc").is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(NonZeroU64);

impl ResourceId {
    /// Creates a resource id, returning `None` for zero.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Option<Self> {
        match NonZeroU64::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Creates a resource id from a signed value as reported by the host.
    ///
    /// Non-positive values are rejected.
    #[inline]
    #[must_use]
    pub fn from_raw(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().and_then(Self::new)
    }

    /// Parses a resource id from caller-supplied text.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        input.trim().parse::<u64>().ok().and_then(Self::new)
    }

    /// Returns the inner value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// The textual form searched for in bodies, attributes, and settings.
    #[must_use]
    pub fn needle(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a content entity (post, page, or any record with a title).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Creates a new entity id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a taxonomy term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(pub u64);

impl TermId {
    /// Creates a new term id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_rejects_invalid() {
        assert!(ResourceId::new(0).is_none());
        assert!(ResourceId::from_raw(0).is_none());
        assert!(ResourceId::from_raw(-1).is_none());
        assert!(ResourceId::parse("").is_none());
        assert!(ResourceId::parse("-5").is_none());
        assert!(ResourceId::parse("12abc").is_none());
    }

    #[test]
    fn test_resource_id_needle_and_display() {
        let id = ResourceId::new(1234).unwrap();
        assert_eq!(id.needle(), "1234");
        assert_eq!(id.to_string(), "1234");
    }

    #[test]
    fn test_resource_id_serde_transparent() {
        let id = ResourceId::new(9).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "9");
        assert_eq!(serde_json::from_str::<ResourceId>("9").unwrap(), id);
        assert!(serde_json::from_str::<ResourceId>("0").is_err());
    }

    #[test]
    fn test_entity_and_term_ids_are_distinct_types() {
        let entity = EntityId::new(5);
        let term = TermId::new(5);
        assert_eq!(entity.0, term.0);
        assert_eq!(entity.to_string(), term.to_string());
    }
}
