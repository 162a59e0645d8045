//! An in-memory content store.
//!
//! [`MemoryContentStore`] implements every lookup capability over a
//! [`SiteSnapshot`], which can be loaded from JSON. It backs the CLI harness
//! and the test suites, and supports per-phase outage injection.
//!
//! # Snapshot format
//!
//! ```json
//! {
//!   "base_url": "https://example.test",
//!   "resources": [{ "id": 12, "url": "https://example.test/uploads/cat.jpg" }],
//!   "entities": [{ "id": 3, "title": "Home", "body": "<img src=\"...\">", "primary_reference": 12 }],
//!   "settings": { "site_logo": "12" },
//!   "terms": [{ "id": 7, "name": "News", "attributes": { "thumbnail_id": "12" } }]
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use parking_lot::RwLock;
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::LookupError;
use crate::source::{
    AttributeLookup, AttributeMatch, EntityDirectory, EntityMatch, ForwardReferenceLookup,
    PrimaryReferenceLookup, ResourceCatalog, SettingsLookup, TaxonomyLookup, TermInfo,
    TextSearchLookup, contains_substring,
};
use crate::types::{EntityId, ReferenceKind, ResourceId, TermId};

// The pattern is a literal; compilation cannot fail.
#[allow(clippy::expect_used)]
static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).expect("img src pattern")
});

#[allow(clippy::expect_used)]
static SIZE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d+x\d+").expect("size suffix pattern"));

fn default_kind() -> String {
    crate::config::DEFAULT_RESOURCE_KIND.to_owned()
}

fn default_status() -> String {
    "publish".to_owned()
}

fn default_entity_kind() -> String {
    "post".to_owned()
}

fn default_taxonomy() -> String {
    "category".to_owned()
}

/// A tracked resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Raw id as stored by the host. May be malformed.
    pub id: i64,
    /// Resource kind.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Public URL of the original file.
    #[serde(default)]
    pub url: Option<String>,
}

/// A content entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Entity id.
    pub id: EntityId,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Publication status.
    #[serde(default = "default_status")]
    pub status: String,
    /// Entity kind (post, page, ...).
    #[serde(default = "default_entity_kind")]
    pub kind: String,
    /// Free-text body.
    #[serde(default)]
    pub body: String,
    /// Primary reference field (the featured resource).
    #[serde(default)]
    pub primary_reference: Option<i64>,
    /// Attribute records.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl EntityEntry {
    /// Creates a published entity with the given title and no content.
    #[must_use]
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id: EntityId(id),
            title: title.into(),
            status: default_status(),
            kind: default_entity_kind(),
            body: String::new(),
            primary_reference: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the primary reference.
    #[must_use]
    pub const fn with_primary_reference(mut self, id: i64) -> Self {
        self.primary_reference = Some(id);
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

/// A taxonomy term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    /// Term id.
    pub id: TermId,
    /// Term name.
    pub name: String,
    /// Taxonomy.
    #[serde(default = "default_taxonomy")]
    pub taxonomy: String,
    /// Term attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// The contents of a site, as served by [`MemoryContentStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSnapshot {
    /// Prefix for generated edit links. No links are produced when empty.
    pub base_url: String,
    /// Tracked resources.
    pub resources: Vec<ResourceEntry>,
    /// Content entities.
    pub entities: Vec<EntityEntry>,
    /// Global settings by name.
    pub settings: BTreeMap<String, String>,
    /// Taxonomy terms.
    pub terms: Vec<TermEntry>,
}

impl SiteSnapshot {
    fn entity(&self, id: EntityId) -> Option<&EntityEntry> {
        self.entities.iter().find(|e| e.id == id)
    }

    fn resource_by_url(&self, url: &str) -> Option<ResourceId> {
        let exact = |candidate: &str| {
            self.resources
                .iter()
                .find(|r| r.url.as_deref() == Some(candidate))
                .and_then(|r| ResourceId::from_raw(r.id))
        };
        exact(url).or_else(|| exact(SIZE_SUFFIX.replace_all(url, "").as_ref()))
    }
}

/// An in-memory implementation of every lookup capability.
///
/// # Examples
///
/// ```
/// use mu_core::{EntityEntry, MemoryContentStore, PrimaryReferenceLookup, ResourceId};
///
/// let store = MemoryContentStore::default();
/// store.upsert_entity(EntityEntry::new(3, "Home").with_primary_reference(12));
///
/// let id = ResourceId::new(12).unwrap();
/// let found = store.find_entities_by_primary_reference(id).unwrap();
/// assert_eq!(found[0].title, "Home");
/// ```
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    site: RwLock<SiteSnapshot>,
    outages: RwLock<FxHashSet<ReferenceKind>>,
}

impl MemoryContentStore {
    /// Serves the given snapshot.
    #[must_use]
    pub fn new(site: SiteSnapshot) -> Self {
        Self {
            site: RwLock::new(site),
            outages: RwLock::default(),
        }
    }

    /// Parses a snapshot from JSON.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw).map(Self::new)
    }

    /// Returns a copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SiteSnapshot {
        self.site.read().clone()
    }

    /// Makes the lookup for `phase` fail (`down == true`) or recover.
    pub fn set_outage(&self, phase: ReferenceKind, down: bool) {
        let mut outages = self.outages.write();
        if down {
            outages.insert(phase);
        } else {
            outages.remove(&phase);
        }
    }

    /// Inserts or replaces an entity.
    pub fn upsert_entity(&self, entity: EntityEntry) {
        let mut site = self.site.write();
        match site.entities.iter_mut().find(|e| e.id == entity.id) {
            Some(existing) => *existing = entity,
            None => site.entities.push(entity),
        }
    }

    /// Removes an entity. Returns `true` if it existed.
    pub fn remove_entity(&self, id: EntityId) -> bool {
        let mut site = self.site.write();
        let before = site.entities.len();
        site.entities.retain(|e| e.id != id);
        site.entities.len() != before
    }

    /// Inserts or replaces a term.
    pub fn upsert_term(&self, term: TermEntry) {
        let mut site = self.site.write();
        match site.terms.iter_mut().find(|t| t.id == term.id) {
            Some(existing) => *existing = term,
            None => site.terms.push(term),
        }
    }

    /// Sets a global setting.
    pub fn set_setting(&self, name: impl Into<String>, value: impl Into<String>) {
        self.site.write().settings.insert(name.into(), value.into());
    }

    /// Adds a resource.
    pub fn add_resource(&self, id: i64, url: Option<String>) {
        self.site.write().resources.push(ResourceEntry {
            id,
            kind: default_kind(),
            url,
        });
    }

    fn check(&self, phase: ReferenceKind, collection: &'static str) -> Result<(), LookupError> {
        if self.outages.read().contains(&phase) {
            Err(LookupError::unavailable(collection, "simulated outage"))
        } else {
            Ok(())
        }
    }
}

impl PrimaryReferenceLookup for MemoryContentStore {
    fn find_entities_by_primary_reference(
        &self,
        id: ResourceId,
    ) -> Result<Vec<EntityMatch>, LookupError> {
        self.check(ReferenceKind::FeaturedReference, "entities")?;
        let target = i64::try_from(id.get()).ok();
        Ok(self
            .site
            .read()
            .entities
            .iter()
            .filter(|e| e.primary_reference.is_some() && e.primary_reference == target)
            .map(|e| EntityMatch::new(e.id, e.title.clone()))
            .collect())
    }
}

impl TextSearchLookup for MemoryContentStore {
    fn find_entities_by_text_search(&self, term: &str) -> Result<Vec<EntityMatch>, LookupError> {
        self.check(ReferenceKind::ContentEmbed, "content")?;
        Ok(self
            .site
            .read()
            .entities
            .iter()
            .filter(|e| contains_substring(&e.body, term))
            .map(|e| EntityMatch::new(e.id, e.title.clone()))
            .collect())
    }
}

impl AttributeLookup for MemoryContentStore {
    fn find_attribute_matches(&self, substring: &str) -> Result<Vec<AttributeMatch>, LookupError> {
        self.check(ReferenceKind::AttributeMatch, "attributes")?;
        let site = self.site.read();
        Ok(site
            .entities
            .iter()
            .flat_map(|e| {
                e.attributes
                    .values()
                    .filter(|value| contains_substring(value, substring))
                    .map(|value| AttributeMatch {
                        entity_id: e.id,
                        payload: value.clone(),
                    })
            })
            .collect())
    }
}

impl SettingsLookup for MemoryContentStore {
    fn find_global_settings_matches(&self, substring: &str) -> Result<Vec<String>, LookupError> {
        self.check(ReferenceKind::GlobalSetting, "settings")?;
        Ok(self
            .site
            .read()
            .settings
            .iter()
            .filter(|(_, value)| contains_substring(value, substring))
            .map(|(name, _)| name.clone())
            .collect())
    }
}

impl TaxonomyLookup for MemoryContentStore {
    fn find_taxonomy_term_matches(&self, substring: &str) -> Result<Vec<TermId>, LookupError> {
        self.check(ReferenceKind::TaxonomyTerm, "terms")?;
        Ok(self
            .site
            .read()
            .terms
            .iter()
            .filter(|t| t.attributes.values().any(|v| contains_substring(v, substring)))
            .map(|t| t.id)
            .collect())
    }

    fn term(&self, id: TermId) -> Option<TermInfo> {
        let site = self.site.read();
        site.terms.iter().find(|t| t.id == id).map(|t| TermInfo {
            name: t.name.clone(),
            taxonomy: t.taxonomy.clone(),
            edit_link: (!site.base_url.is_empty())
                .then(|| format!("{}/admin/terms/{}/{}/edit", site.base_url, t.taxonomy, t.id)),
        })
    }
}

impl EntityDirectory for MemoryContentStore {
    fn entity_edit_link(&self, id: EntityId) -> Option<String> {
        let site = self.site.read();
        if site.base_url.is_empty() {
            return None;
        }
        site.entity(id)
            .map(|e| format!("{}/admin/{}/{}/edit", site.base_url, e.kind, e.id))
    }

    fn entity_title(&self, id: EntityId) -> Option<String> {
        self.site.read().entity(id).map(|e| e.title.clone())
    }

    fn entity_status(&self, id: EntityId) -> Option<String> {
        self.site.read().entity(id).map(|e| e.status.clone())
    }
}

impl ResourceCatalog for MemoryContentStore {
    fn list_resource_ids(&self, kind: &str) -> Result<Vec<i64>, LookupError> {
        Ok(self
            .site
            .read()
            .resources
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.id)
            .collect())
    }
}

impl ForwardReferenceLookup for MemoryContentStore {
    fn resources_referenced_by(&self, entity: EntityId) -> Result<Vec<ResourceId>, LookupError> {
        let site = self.site.read();
        let Some(entry) = site.entity(entity) else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        let mut seen = FxHashSet::default();
        let mut push = |id: ResourceId| {
            if seen.insert(id) {
                found.push(id);
            }
        };

        if let Some(id) = entry.primary_reference.and_then(ResourceId::from_raw) {
            push(id);
        }
        for capture in IMG_SRC.captures_iter(&entry.body) {
            if let Some(id) = capture.get(1).and_then(|src| site.resource_by_url(src.as_str())) {
                push(id);
            }
        }
        for value in entry.attributes.values() {
            if let Some(id) = site.resource_by_url(value) {
                push(id);
            }
        }
        Ok(found)
    }
}
