// ============================================
// Item Catalog
// ============================================
//
// Read-side access to the item universe. The engine only ever needs two
// queries: resolve a single item by id, and list the currently open items.
//
// Note: This module uses trait-based abstraction for catalog lookups to
// allow flexible integration with an existing markets database. The
// in-memory implementation backs tests and single-process deployments.

use crate::models::{Item, ItemStatus};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog backend unavailable: {0}")]
    Unavailable(String),

    #[error("catalog query failed: {0}")]
    Query(String),
}

/// Catalog lookups required by the ranking pipeline.
/// Implement this trait to serve items from your own storage.
pub trait ItemCatalog: Send + Sync {
    /// Resolve a single item by id. `Ok(None)` means the id is unknown.
    fn get(&self, item_id: &str) -> Result<Option<Arc<Item>>>;

    /// All items currently open for trading.
    fn open_items(&self) -> Result<Vec<Arc<Item>>>;
}

/// In-memory catalog keyed by item id.
#[derive(Default)]
pub struct InMemoryCatalog {
    items: DashMap<String, Arc<Item>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<Item>) -> Self {
        let catalog = Self::new();
        for item in items {
            catalog.upsert(item);
        }
        catalog
    }

    /// Insert or replace an item. Later upserts win wholesale; there is no
    /// field-level merge.
    pub fn upsert(&self, item: Item) {
        self.items.insert(item.id.clone(), Arc::new(item));
    }

    pub fn remove(&self, item_id: &str) -> Option<Arc<Item>> {
        self.items.remove(item_id).map(|(_, item)| item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl ItemCatalog for InMemoryCatalog {
    fn get(&self, item_id: &str) -> Result<Option<Arc<Item>>> {
        Ok(self.items.get(item_id).map(|entry| Arc::clone(entry.value())))
    }

    fn open_items(&self) -> Result<Vec<Arc<Item>>> {
        Ok(self
            .items
            .iter()
            .filter(|entry| entry.value().status == ItemStatus::Open)
            .map(|entry| Arc::clone(entry.value()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: &str, status: ItemStatus) -> Item {
        Item {
            id: id.to_string(),
            category: "sports".to_string(),
            tags: vec!["nba".to_string()],
            probability: 0.5,
            volume_24h: 100.0,
            volume_total: 1_000.0,
            created_at: Utc::now(),
            resolution_at: None,
            status,
        }
    }

    #[test]
    fn test_get_returns_none_for_unknown_id() {
        let catalog = InMemoryCatalog::new();
        assert!(catalog.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_open_items_excludes_closed_and_resolved() {
        let catalog = InMemoryCatalog::with_items(vec![
            item("m1", ItemStatus::Open),
            item("m2", ItemStatus::Closed),
            item("m3", ItemStatus::Resolved),
            item("m4", ItemStatus::Open),
        ]);

        let open = catalog.open_items().unwrap();
        let mut ids: Vec<_> = open.iter().map(|i| i.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["m1", "m4"]);
    }

    #[test]
    fn test_upsert_replaces_existing_item() {
        let catalog = InMemoryCatalog::new();
        catalog.upsert(item("m1", ItemStatus::Open));

        let mut updated = item("m1", ItemStatus::Open);
        updated.probability = 0.9;
        catalog.upsert(updated);

        assert_eq!(catalog.len(), 1);
        let stored = catalog.get("m1").unwrap().unwrap();
        assert!((stored.probability - 0.9).abs() < f64::EPSILON);
    }
}
