//! The five lookup phases.
//!
//! Each phase queries one collection and turns its matches into labelled
//! [`Reference`]s. Phases never deduplicate; that is the collector's job.

use mu_core::{
    ContentSources, EntityId, LookupError, Reference, ReferenceKind, ResourceId, ScanConfig,
};

/// Runs a single phase against `sources`.
pub(crate) fn run(
    phase: ReferenceKind,
    sources: &ContentSources,
    config: &ScanConfig,
    id: ResourceId,
) -> Result<Vec<Reference>, LookupError> {
    match phase {
        ReferenceKind::FeaturedReference => featured(sources, id),
        ReferenceKind::ContentEmbed => content_embeds(sources, id),
        ReferenceKind::AttributeMatch => attribute_matches(sources, id),
        ReferenceKind::GlobalSetting => global_settings(sources, config, id),
        ReferenceKind::TaxonomyTerm => taxonomy_terms(sources, id),
    }
}

fn entity_title(sources: &ContentSources, id: EntityId) -> String {
    sources
        .directory
        .entity_title(id)
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| format!("#{id}"))
}

fn featured(sources: &ContentSources, id: ResourceId) -> Result<Vec<Reference>, LookupError> {
    Ok(sources
        .primary
        .find_entities_by_primary_reference(id)?
        .into_iter()
        .map(|m| {
            let link = sources.directory.entity_edit_link(m.id);
            Reference::featured(m.id, m.title, link)
        })
        .collect())
}

fn content_embeds(sources: &ContentSources, id: ResourceId) -> Result<Vec<Reference>, LookupError> {
    Ok(sources
        .text
        .find_entities_by_text_search(&id.needle())?
        .into_iter()
        .map(|m| {
            let link = sources.directory.entity_edit_link(m.id);
            Reference::content_embed(m.id, m.title, link)
        })
        .collect())
}

fn attribute_matches(
    sources: &ContentSources,
    id: ResourceId,
) -> Result<Vec<Reference>, LookupError> {
    Ok(sources
        .attributes
        .find_attribute_matches(&id.needle())?
        .into_iter()
        .map(|m| {
            let title = entity_title(sources, m.entity_id);
            let status = sources.directory.entity_status(m.entity_id);
            let link = sources.directory.entity_edit_link(m.entity_id);
            Reference::attribute_match(m.entity_id, &title, status.as_deref(), link)
        })
        .collect())
}

fn global_settings(
    sources: &ContentSources,
    config: &ScanConfig,
    id: ResourceId,
) -> Result<Vec<Reference>, LookupError> {
    Ok(sources
        .settings
        .find_global_settings_matches(&id.needle())?
        .iter()
        .filter(|name| !config.is_own_setting(name))
        .map(|name| Reference::global_setting(name))
        .collect())
}

fn taxonomy_terms(sources: &ContentSources, id: ResourceId) -> Result<Vec<Reference>, LookupError> {
    Ok(sources
        .taxonomy
        .find_taxonomy_term_matches(&id.needle())?
        .into_iter()
        .map(|term_id| match sources.taxonomy.term(term_id) {
            Some(info) => Reference::taxonomy_term(term_id, &info.name, info.edit_link),
            None => Reference::taxonomy_term(term_id, &format!("#{term_id}"), None),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use mu_core::{EntityEntry, MemoryContentStore, TermEntry, TermId};

    fn sources(store: &Arc<MemoryContentStore>) -> ContentSources {
        ContentSources::from_store(Arc::clone(store))
    }

    fn id(raw: u64) -> ResourceId {
        ResourceId::new(raw).unwrap()
    }

    #[test]
    fn test_attribute_label_includes_status() {
        let store = Arc::new(MemoryContentStore::default());
        store.upsert_entity(
            EntityEntry::new(4, "About")
                .with_status("draft")
                .with_attribute("gallery", "a:2:{i:0;i:31;i:1;i:32;}"),
        );

        let refs = run(ReferenceKind::AttributeMatch, &sources(&store), &ScanConfig::default(), id(31))
            .unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].label, "About (draft)");
    }

    #[test]
    fn test_untitled_entity_falls_back_to_id() {
        let store = Arc::new(MemoryContentStore::default());
        store.upsert_entity(EntityEntry::new(9, "").with_attribute("thumb", "5"));

        let refs = run(ReferenceKind::AttributeMatch, &sources(&store), &ScanConfig::default(), id(5))
            .unwrap();
        assert_eq!(refs[0].label, "#9 (publish)");
    }

    #[test]
    fn test_settings_skip_own_namespace() {
        let store = Arc::new(MemoryContentStore::default());
        store.set_setting("site_icon", "77");
        store.set_setting("media_usage:record:77", "{\"resource_id\":77}");

        let refs = run(ReferenceKind::GlobalSetting, &sources(&store), &ScanConfig::default(), id(77))
            .unwrap();
        assert_eq!(refs, vec![Reference::global_setting("site_icon")]);
    }

    #[test]
    fn test_taxonomy_label() {
        let store = Arc::new(MemoryContentStore::default());
        store.upsert_term(TermEntry {
            id: TermId(3),
            name: "Dogs".into(),
            taxonomy: "category".into(),
            attributes: [("thumbnail_id".to_owned(), "8".to_owned())].into_iter().collect(),
        });

        let refs = run(ReferenceKind::TaxonomyTerm, &sources(&store), &ScanConfig::default(), id(8))
            .unwrap();
        assert_eq!(refs[0].label, "Term: Dogs");
    }

    #[test]
    fn test_phase_failure_is_reported() {
        let store = Arc::new(MemoryContentStore::default());
        store.set_outage(ReferenceKind::ContentEmbed, true);

        let err = run(ReferenceKind::ContentEmbed, &sources(&store), &ScanConfig::default(), id(1))
            .unwrap_err();
        assert_eq!(err.collection, "content");
    }
}
