//! References: evidence that a resource is used somewhere.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{EntityId, TermId};

/// How a reference was discovered.
///
/// The variants are declared in lookup phase order. When the same entity is
/// found by several phases, the earliest phase wins.
///
/// # Examples
///
/// ```
/// use mu_core::ReferenceKind;
///
/// assert_eq!(ReferenceKind::ALL[0], ReferenceKind::FeaturedReference);
/// assert!(ReferenceKind::ContentEmbed < ReferenceKind::TaxonomyTerm);
/// assert_eq!(ReferenceKind::GlobalSetting.as_str(), "global_setting");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// The entity's primary reference field points at the resource.
    FeaturedReference,
    /// The entity's free-text body contains the resource id.
    ContentEmbed,
    /// An attribute record attached to the entity contains the resource id.
    AttributeMatch,
    /// A global setting value contains the resource id.
    GlobalSetting,
    /// A taxonomy term attribute contains the resource id.
    TaxonomyTerm,
}

impl ReferenceKind {
    /// All kinds in lookup phase order.
    pub const ALL: [Self; 5] = [
        Self::FeaturedReference,
        Self::ContentEmbed,
        Self::AttributeMatch,
        Self::GlobalSetting,
        Self::TaxonomyTerm,
    ];

    /// Returns the snake_case name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FeaturedReference => "featured_reference",
            Self::ContentEmbed => "content_embed",
            Self::AttributeMatch => "attribute_match",
            Self::GlobalSetting => "global_setting",
            Self::TaxonomyTerm => "taxonomy_term",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a referencing entity, used for deduplication and invalidation.
///
/// Featured references, content embeds, and attribute matches all point at
/// content entities and share the [`Entity`](Self::Entity) bucket. Settings
/// are keyed by name, terms by term id.
///
/// # Examples
///
/// ```
/// use mu_core::{EntityId, EntityKey, TermId};
///
/// assert_eq!(EntityKey::Entity(EntityId(12)).storage_suffix(), "entity:12");
/// assert_eq!(EntityKey::Setting("site_logo".into()).storage_suffix(), "setting:site_logo");
/// assert_eq!(EntityKey::Term(TermId(3)).storage_suffix(), "term:3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "bucket", content = "id", rename_all = "snake_case")]
pub enum EntityKey {
    /// A content entity.
    Entity(EntityId),
    /// A global setting, by name.
    Setting(String),
    /// A taxonomy term.
    Term(TermId),
}

impl EntityKey {
    /// Suffix used for reverse index keys in persisted storage.
    #[must_use]
    pub fn storage_suffix(&self) -> String {
        match self {
            Self::Entity(id) => format!("entity:{id}"),
            Self::Setting(name) => format!("setting:{name}"),
            Self::Term(id) => format!("term:{id}"),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_suffix())
    }
}

impl From<EntityId> for EntityKey {
    #[inline]
    fn from(id: EntityId) -> Self {
        Self::Entity(id)
    }
}

impl From<TermId> for EntityKey {
    #[inline]
    fn from(id: TermId) -> Self {
        Self::Term(id)
    }
}

/// One place a resource is used.
///
/// Immutable once constructed. Labels are plain text; rendering them as
/// links is left to the caller, using [`edit_link`](Self::edit_link).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// How the reference was discovered.
    pub kind: ReferenceKind,

    /// The referencing entity.
    pub entity: EntityKey,

    /// Human-readable label.
    pub label: String,

    /// Link to edit the referencing entity, when the host provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_link: Option<String>,
}

impl Reference {
    /// An entity whose primary reference field is the resource.
    #[must_use]
    pub fn featured(id: EntityId, title: impl Into<String>, edit_link: Option<String>) -> Self {
        Self {
            kind: ReferenceKind::FeaturedReference,
            entity: EntityKey::Entity(id),
            label: title.into(),
            edit_link,
        }
    }

    /// An entity whose body embeds the resource.
    #[must_use]
    pub fn content_embed(id: EntityId, title: impl Into<String>, edit_link: Option<String>) -> Self {
        Self {
            kind: ReferenceKind::ContentEmbed,
            entity: EntityKey::Entity(id),
            label: title.into(),
            edit_link,
        }
    }

    /// An entity with an attribute containing the resource.
    ///
    /// The entity status is appended to the label when known.
    ///
    /// ```
    /// use mu_core::{EntityId, Reference};
    ///
    /// let reference = Reference::attribute_match(EntityId(4), "About", Some("draft"), None);
    /// assert_eq!(reference.label, "About (draft)");
    /// ```
    #[must_use]
    pub fn attribute_match(
        id: EntityId,
        title: &str,
        status: Option<&str>,
        edit_link: Option<String>,
    ) -> Self {
        let label = match status {
            Some(status) if !status.is_empty() => format!("{title} ({status})"),
            _ => title.to_owned(),
        };
        Self {
            kind: ReferenceKind::AttributeMatch,
            entity: EntityKey::Entity(id),
            label,
            edit_link,
        }
    }

    /// A global setting containing the resource.
    #[must_use]
    pub fn global_setting(name: &str) -> Self {
        Self {
            kind: ReferenceKind::GlobalSetting,
            entity: EntityKey::Setting(name.to_owned()),
            label: format!("Option name: {name}"),
            edit_link: None,
        }
    }

    /// A taxonomy term containing the resource.
    #[must_use]
    pub fn taxonomy_term(id: TermId, name: &str, edit_link: Option<String>) -> Self {
        Self {
            kind: ReferenceKind::TaxonomyTerm,
            entity: EntityKey::Term(id),
            label: format!("Term: {name}"),
            edit_link,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let mut sorted = ReferenceKind::ALL;
        sorted.sort();
        assert_eq!(sorted, ReferenceKind::ALL);
    }

    #[test]
    fn test_entity_kinds_share_bucket() {
        let featured = Reference::featured(EntityId(7), "Home", None);
        let embed = Reference::content_embed(EntityId(7), "Home", None);
        let attr = Reference::attribute_match(EntityId(7), "Home", Some("publish"), None);
        assert_eq!(featured.entity, embed.entity);
        assert_eq!(embed.entity, attr.entity);
    }

    #[test]
    fn test_labels() {
        assert_eq!(Reference::attribute_match(EntityId(1), "Post", None, None).label, "Post");
        assert_eq!(Reference::attribute_match(EntityId(1), "Post", Some(""), None).label, "Post");
        assert_eq!(Reference::global_setting("site_icon").label, "Option name: site_icon");
        assert_eq!(
            Reference::taxonomy_term(TermId(3), "News", None).label,
            "Term: News"
        );
    }

    #[test]
    fn test_entity_key_serde_shape() {
        let key = EntityKey::Entity(EntityId(12));
        assert_eq!(
            serde_json::to_string(&key).unwrap(),
            r#"{"bucket":"entity","id":12}"#
        );
        let setting = EntityKey::Setting("logo".into());
        assert_eq!(
            serde_json::to_string(&setting).unwrap(),
            r#"{"bucket":"setting","id":"logo"}"#
        );
    }

    #[test]
    fn test_reference_skips_missing_edit_link() {
        let json = serde_json::to_string(&Reference::global_setting("x")).unwrap();
        assert!(!json.contains("edit_link"));
    }
}
