//! Lookup capabilities consumed by the reference scanner.
//!
//! Each lookup phase has its own trait so it can be mocked independently.
//! A host content store usually implements all of them on one type; see
//! [`ContentSources::from_store`].
//!
//! | Trait | Phase |
//! |-------|-------|
//! | [`PrimaryReferenceLookup`] | entities whose primary reference field equals the id |
//! | [`TextSearchLookup`] | entities whose body contains the id |
//! | [`AttributeLookup`] | attribute records whose value contains the id |
//! | [`SettingsLookup`] | global settings whose value contains the id |
//! | [`TaxonomyLookup`] | terms whose attribute value contains the id |
//!
//! [`EntityDirectory`] resolves titles, statuses and edit links.
//! [`ResourceCatalog`] enumerates resources for batch jobs, and the optional
//! [`ForwardReferenceLookup`] lists the resources an entity currently uses.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::LookupError;
use crate::types::{EntityId, ResourceId, TermId};

/// Substring predicate shared by every "value contains the id" phase.
///
/// An empty needle never matches.
///
/// # Examples
///
/// ```
/// use mu_core::contains_substring;
///
/// assert!(contains_substring("a:1:{i:0;s:3:\"412\";}", "412"));
/// assert!(!contains_substring("anything", ""));
/// ```
#[inline]
#[must_use]
pub fn contains_substring(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && haystack.contains(needle)
}

/// A content entity returned by an entity search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMatch {
    /// The matching entity.
    pub id: EntityId,
    /// Its title at the time of the search.
    pub title: String,
}

impl EntityMatch {
    /// Creates a new match.
    #[must_use]
    pub fn new(id: EntityId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}

/// An attribute record whose value contained the search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMatch {
    /// The entity owning the attribute.
    pub entity_id: EntityId,
    /// The raw attribute value.
    pub payload: String,
}

/// Display data for a taxonomy term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermInfo {
    /// Term name.
    pub name: String,
    /// Taxonomy the term belongs to (e.g. `"category"`).
    pub taxonomy: String,
    /// Link to edit the term.
    pub edit_link: Option<String>,
}

/// Phase 1: entities whose primary reference field equals the id.
pub trait PrimaryReferenceLookup: Send + Sync {
    /// Finds entities whose primary reference is `id`.
    fn find_entities_by_primary_reference(
        &self,
        id: ResourceId,
    ) -> Result<Vec<EntityMatch>, LookupError>;
}

/// Phase 2: entities whose free-text body contains a term.
pub trait TextSearchLookup: Send + Sync {
    /// Finds entities whose body contains `term`.
    fn find_entities_by_text_search(&self, term: &str) -> Result<Vec<EntityMatch>, LookupError>;
}

/// Phase 3: attribute records whose value contains a substring.
pub trait AttributeLookup: Send + Sync {
    /// Finds attribute records whose value contains `substring`.
    fn find_attribute_matches(&self, substring: &str) -> Result<Vec<AttributeMatch>, LookupError>;
}

/// Phase 4: global settings whose value contains a substring.
pub trait SettingsLookup: Send + Sync {
    /// Returns the names of matching settings.
    fn find_global_settings_matches(&self, substring: &str) -> Result<Vec<String>, LookupError>;
}

/// Phase 5: taxonomy terms whose attribute value contains a substring.
pub trait TaxonomyLookup: Send + Sync {
    /// Returns the ids of matching terms.
    fn find_taxonomy_term_matches(&self, substring: &str) -> Result<Vec<TermId>, LookupError>;

    /// Resolves display data for a term.
    fn term(&self, id: TermId) -> Option<TermInfo>;
}

/// Entity metadata used to build reference labels.
pub trait EntityDirectory: Send + Sync {
    /// Link to edit the entity.
    fn entity_edit_link(&self, id: EntityId) -> Option<String>;
    /// Current title of the entity.
    fn entity_title(&self, id: EntityId) -> Option<String>;
    /// Publication status of the entity (e.g. `"publish"`, `"draft"`).
    fn entity_status(&self, id: EntityId) -> Option<String>;
}

/// Enumerates resources for batch jobs.
pub trait ResourceCatalog: Send + Sync {
    /// Returns the raw ids of every resource of `kind`.
    ///
    /// Ids are reported as the host stores them and may be malformed;
    /// callers filter them.
    fn list_resource_ids(&self, kind: &str) -> Result<Vec<i64>, LookupError>;

    /// Returns `true` if `id` is a resource of `kind`.
    ///
    /// The default walks [`list_resource_ids`](Self::list_resource_ids);
    /// hosts with an indexed lookup should override it.
    fn contains_resource(&self, kind: &str, id: ResourceId) -> Result<bool, LookupError> {
        Ok(self
            .list_resource_ids(kind)?
            .into_iter()
            .any(|raw| ResourceId::from_raw(raw) == Some(id)))
    }
}

/// Resources an entity currently references.
///
/// Used on entity mutation so that a resource newly embedded into an entity
/// is rescanned along with those the entity used to reference.
pub trait ForwardReferenceLookup: Send + Sync {
    /// Returns the resources `entity` references right now.
    fn resources_referenced_by(&self, entity: EntityId) -> Result<Vec<ResourceId>, LookupError>;
}

/// The full set of collaborators the scanner queries.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use mu_core::{ContentSources, MemoryContentStore};
///
/// let store = Arc::new(MemoryContentStore::default());
/// let sources = ContentSources::from_store(store);
/// assert!(sources.forward.is_some());
/// ```
#[derive(Clone)]
pub struct ContentSources {
    /// Phase 1.
    pub primary: Arc<dyn PrimaryReferenceLookup>,
    /// Phase 2.
    pub text: Arc<dyn TextSearchLookup>,
    /// Phase 3.
    pub attributes: Arc<dyn AttributeLookup>,
    /// Phase 4.
    pub settings: Arc<dyn SettingsLookup>,
    /// Phase 5.
    pub taxonomy: Arc<dyn TaxonomyLookup>,
    /// Titles, statuses and edit links.
    pub directory: Arc<dyn EntityDirectory>,
    /// Resource enumeration.
    pub catalog: Arc<dyn ResourceCatalog>,
    /// Optional forward lookup for entity mutations.
    pub forward: Option<Arc<dyn ForwardReferenceLookup>>,
}

impl ContentSources {
    /// Uses one store for every capability, including forward lookups.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: PrimaryReferenceLookup
            + TextSearchLookup
            + AttributeLookup
            + SettingsLookup
            + TaxonomyLookup
            + EntityDirectory
            + ResourceCatalog
            + ForwardReferenceLookup
            + 'static,
    {
        Self {
            primary: Arc::clone(&store) as Arc<dyn PrimaryReferenceLookup>,
            text: Arc::clone(&store) as Arc<dyn TextSearchLookup>,
            attributes: Arc::clone(&store) as Arc<dyn AttributeLookup>,
            settings: Arc::clone(&store) as Arc<dyn SettingsLookup>,
            taxonomy: Arc::clone(&store) as Arc<dyn TaxonomyLookup>,
            directory: Arc::clone(&store) as Arc<dyn EntityDirectory>,
            catalog: Arc::clone(&store) as Arc<dyn ResourceCatalog>,
            forward: Some(store as Arc<dyn ForwardReferenceLookup>),
        }
    }

    /// Replaces the phase 1 lookup.
    #[must_use]
    pub fn with_primary(mut self, lookup: Arc<dyn PrimaryReferenceLookup>) -> Self {
        self.primary = lookup;
        self
    }

    /// Replaces the phase 2 lookup.
    #[must_use]
    pub fn with_text(mut self, lookup: Arc<dyn TextSearchLookup>) -> Self {
        self.text = lookup;
        self
    }

    /// Replaces the phase 3 lookup.
    #[must_use]
    pub fn with_attributes(mut self, lookup: Arc<dyn AttributeLookup>) -> Self {
        self.attributes = lookup;
        self
    }

    /// Replaces the phase 4 lookup.
    #[must_use]
    pub fn with_settings(mut self, lookup: Arc<dyn SettingsLookup>) -> Self {
        self.settings = lookup;
        self
    }

    /// Replaces the phase 5 lookup.
    #[must_use]
    pub fn with_taxonomy(mut self, lookup: Arc<dyn TaxonomyLookup>) -> Self {
        self.taxonomy = lookup;
        self
    }

    /// Replaces or removes the forward lookup.
    #[must_use]
    pub fn with_forward(mut self, lookup: Option<Arc<dyn ForwardReferenceLookup>>) -> Self {
        self.forward = lookup;
        self
    }
}

impl fmt::Debug for ContentSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSources")
            .field("forward", &self.forward.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoSettings;

    impl SettingsLookup for NoSettings {
        fn find_global_settings_matches(&self, _: &str) -> Result<Vec<String>, LookupError> {
            Err(LookupError::unavailable("settings", "offline"))
        }
    }

    #[test]
    fn test_contains_substring() {
        assert!(contains_substring("wp-image-12", "12"));
        assert!(!contains_substring("wp-image-12", "13"));
        assert!(!contains_substring("", ""));
    }

    #[test]
    fn test_override_single_capability() {
        let store = Arc::new(crate::MemoryContentStore::default());
        let sources = ContentSources::from_store(store).with_settings(Arc::new(NoSettings));
        assert!(sources.settings.find_global_settings_matches("1").is_err());
        assert!(sources.text.find_entities_by_text_search("1").unwrap().is_empty());
    }

    #[test]
    fn test_remove_forward_lookup() {
        let store = Arc::new(crate::MemoryContentStore::default());
        let sources = ContentSources::from_store(store).with_forward(None);
        assert!(sources.forward.is_none());
        assert_eq!(format!("{sources:?}"), "ContentSources { forward: false, .. }");
    }
}
