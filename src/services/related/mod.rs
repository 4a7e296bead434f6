// Tag-overlap related-item lookup for item detail surfaces.

use crate::models::RelatedItem;
use crate::store::catalog::{self, ItemCatalog};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

pub struct RelatedService {
    catalog: Arc<dyn ItemCatalog>,
}

impl RelatedService {
    pub fn new(catalog: Arc<dyn ItemCatalog>) -> Self {
        Self { catalog }
    }

    /// Open items sharing at least one tag with the target, most shared
    /// tags first, total volume as tie-break. The target itself is
    /// excluded. Unknown or untagged targets yield an empty list.
    pub fn related_items(&self, item_id: &str, limit: usize) -> catalog::Result<Vec<RelatedItem>> {
        let Some(target) = self.catalog.get(item_id)? else {
            return Ok(Vec::new());
        };
        let target_tags: HashSet<&str> = target.tags.iter().map(String::as_str).collect();
        if target_tags.is_empty() {
            return Ok(Vec::new());
        }

        let mut related: Vec<RelatedItem> = self
            .catalog
            .open_items()?
            .into_iter()
            .filter(|item| item.id != item_id)
            .filter_map(|item| {
                let shared = item
                    .tags
                    .iter()
                    .filter(|tag| target_tags.contains(tag.as_str()))
                    .count();
                (shared > 0).then(|| RelatedItem {
                    item,
                    shared_tags: shared,
                })
            })
            .collect();

        related.sort_by(|a, b| {
            b.shared_tags.cmp(&a.shared_tags).then_with(|| {
                b.item
                    .volume_total
                    .partial_cmp(&a.item.volume_total)
                    .unwrap_or(Ordering::Equal)
            })
        });
        related.truncate(limit);
        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Item, ItemStatus};
    use crate::store::InMemoryCatalog;
    use chrono::{Duration, Utc};

    fn item(id: &str, tags: &[&str], volume_total: f64, status: ItemStatus) -> Item {
        Item {
            id: id.to_string(),
            category: "sports".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            probability: 0.5,
            volume_24h: 100.0,
            volume_total,
            created_at: Utc::now() - Duration::days(2),
            resolution_at: None,
            status,
        }
    }

    fn service(items: Vec<Item>) -> RelatedService {
        RelatedService::new(Arc::new(InMemoryCatalog::with_items(items)))
    }

    #[test]
    fn test_orders_by_shared_tag_count_then_volume() {
        let service = service(vec![
            item("target", &["nba", "finals", "lakers"], 1_000.0, ItemStatus::Open),
            item("two-shared", &["nba", "finals"], 500.0, ItemStatus::Open),
            item("one-shared-big", &["nba", "draft"], 9_000.0, ItemStatus::Open),
            item("one-shared-small", &["nba"], 200.0, ItemStatus::Open),
            item("unrelated", &["elections"], 9_999.0, ItemStatus::Open),
        ]);

        let related = service.related_items("target", 10).unwrap();
        let ids: Vec<&str> = related.iter().map(|r| r.item.id.as_str()).collect();

        assert_eq!(ids, ["two-shared", "one-shared-big", "one-shared-small"]);
        assert_eq!(related[0].shared_tags, 2);
    }

    #[test]
    fn test_excludes_closed_items_and_respects_limit() {
        let service = service(vec![
            item("target", &["nba"], 1_000.0, ItemStatus::Open),
            item("open-1", &["nba"], 800.0, ItemStatus::Open),
            item("open-2", &["nba"], 600.0, ItemStatus::Open),
            item("closed", &["nba"], 9_000.0, ItemStatus::Closed),
        ]);

        let related = service.related_items("target", 1).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].item.id, "open-1");
    }

    #[test]
    fn test_untagged_or_unknown_target_yields_empty() {
        let service = service(vec![
            item("bare", &[], 1_000.0, ItemStatus::Open),
            item("other", &["nba"], 500.0, ItemStatus::Open),
        ]);

        assert!(service.related_items("bare", 5).unwrap().is_empty());
        assert!(service.related_items("missing", 5).unwrap().is_empty());
    }
}
