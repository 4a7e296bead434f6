// ============================================
// Event Store
// ============================================
//
// Append-only engagement log with two indexes (by item, by user) plus a
// per-geo last-activity marker. Rollup jobs sweep the item index, the
// scorer sweeps the user index, and maintenance prunes both by age.

use crate::models::StoredEvent;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Geo buckets that never form a trending scope of their own.
const UNSCOPED_GEOS: [&str; 3] = ["", "UNKNOWN", "LOCAL"];

/// View and trade counts over the three rollup windows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActivityCounts {
    pub views_5m: u64,
    pub views_1h: u64,
    pub views_24h: u64,
    pub trades_5m: u64,
    pub trades_1h: u64,
    pub trades_24h: u64,
}

#[derive(Default)]
pub struct EventStore {
    by_item: DashMap<String, VecDeque<Arc<StoredEvent>>>,
    by_user: DashMap<String, VecDeque<Arc<StoredEvent>>>,
    geo_last_seen: DashMap<String, DateTime<Utc>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event to both indexes and return the shared record.
    pub fn record(&self, event: StoredEvent) -> Arc<StoredEvent> {
        let event = Arc::new(event);

        self.by_item
            .entry(event.item_id.clone())
            .or_default()
            .push_back(Arc::clone(&event));
        self.by_user
            .entry(event.user_id.clone())
            .or_default()
            .push_back(Arc::clone(&event));

        if let Some(geo) = event.geo_bucket.as_deref() {
            if !UNSCOPED_GEOS.contains(&geo) {
                self.geo_last_seen
                    .entry(geo.to_string())
                    .and_modify(|last| {
                        if event.ts > *last {
                            *last = event.ts;
                        }
                    })
                    .or_insert(event.ts);
            }
        }

        event
    }

    /// Count view-class and trade-class events for one item in a single
    /// sweep. `geo` of `None` counts every event regardless of bucket.
    pub fn activity_counts(
        &self,
        item_id: &str,
        geo: Option<&str>,
        cutoff_5m: DateTime<Utc>,
        cutoff_1h: DateTime<Utc>,
        cutoff_24h: DateTime<Utc>,
    ) -> ActivityCounts {
        let mut counts = ActivityCounts::default();
        let Some(events) = self.by_item.get(item_id) else {
            return counts;
        };

        for event in events.iter() {
            if let Some(geo) = geo {
                if event.geo_bucket.as_deref() != Some(geo) {
                    continue;
                }
            }
            if event.ts <= cutoff_24h {
                continue;
            }

            let is_view = event.kind.is_view_class();
            let is_trade = event.kind.is_trade_class();
            if !is_view && !is_trade {
                continue;
            }

            if is_view {
                counts.views_24h += 1;
            } else {
                counts.trades_24h += 1;
            }
            if event.ts > cutoff_1h {
                if is_view {
                    counts.views_1h += 1;
                } else {
                    counts.trades_1h += 1;
                }
            }
            if event.ts > cutoff_5m {
                if is_view {
                    counts.views_5m += 1;
                } else {
                    counts.trades_5m += 1;
                }
            }
        }

        counts
    }

    /// Items with at least one event after `since`, regardless of geo.
    pub fn active_item_ids(&self, since: DateTime<Utc>) -> Vec<String> {
        self.by_item
            .iter()
            .filter(|entry| entry.value().iter().any(|e| e.ts > since))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Geo buckets with activity after `since`. Unscoped buckets never
    /// appear here.
    pub fn active_geos(&self, since: DateTime<Utc>) -> Vec<String> {
        self.geo_last_seen
            .iter()
            .filter(|entry| *entry.value() > since)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of events a user generated after `since`. Synthetic
    /// impressions are excluded when classifying user maturity.
    pub fn user_event_count(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        exclude_impressions: bool,
    ) -> u64 {
        let Some(events) = self.by_user.get(user_id) else {
            return 0;
        };
        events
            .iter()
            .filter(|e| e.ts > since)
            .filter(|e| !exclude_impressions || !e.kind.is_impression())
            .count() as u64
    }

    pub fn user_last_activity(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.by_user
            .get(user_id)
            .and_then(|events| events.iter().map(|e| e.ts).max())
    }

    /// Drop every event older than `before` from both indexes. Returns the
    /// number of events removed.
    pub fn prune(&self, before: DateTime<Utc>) -> u64 {
        let mut removed = 0u64;
        self.by_item.retain(|_, events| {
            let prior = events.len();
            events.retain(|e| e.ts >= before);
            removed += (prior - events.len()) as u64;
            !events.is_empty()
        });
        self.by_user.retain(|_, events| {
            events.retain(|e| e.ts >= before);
            !events.is_empty()
        });
        self.geo_last_seen.retain(|_, last| *last >= before);
        removed
    }

    pub fn event_count(&self) -> usize {
        self.by_item.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventInput, EventKind};
    use chrono::Duration;

    fn stored(
        user: &str,
        item: &str,
        kind: EventKind,
        geo: Option<&str>,
        ts: DateTime<Utc>,
    ) -> StoredEvent {
        let mut input = EventInput::new(user, item, kind);
        input.geo_bucket = geo.map(|g| g.to_string());
        StoredEvent::from_input(input, ts)
    }

    #[test]
    fn test_activity_counts_split_by_window_and_class() {
        let store = EventStore::new();
        let now = Utc::now();

        store.record(stored("u1", "m1", EventKind::Click, None, now - Duration::minutes(2)));
        store.record(stored("u2", "m1", EventKind::View, None, now - Duration::minutes(30)));
        store.record(stored("u3", "m1", EventKind::Participate, None, now - Duration::hours(3)));
        store.record(stored("u4", "m1", EventKind::Bookmark, None, now - Duration::minutes(10)));
        store.record(stored("u5", "m1", EventKind::View, None, now - Duration::hours(30)));

        let counts = store.activity_counts(
            "m1",
            None,
            now - Duration::minutes(5),
            now - Duration::hours(1),
            now - Duration::hours(24),
        );

        assert_eq!(counts.views_5m, 1);
        assert_eq!(counts.views_1h, 2);
        assert_eq!(counts.views_24h, 2);
        assert_eq!(counts.trades_24h, 1);
        assert_eq!(counts.trades_1h, 0);
    }

    #[test]
    fn test_activity_counts_respect_geo_filter() {
        let store = EventStore::new();
        let now = Utc::now();

        store.record(stored("u1", "m1", EventKind::Click, Some("US"), now - Duration::minutes(1)));
        store.record(stored("u2", "m1", EventKind::Click, Some("BR"), now - Duration::minutes(1)));
        store.record(stored("u3", "m1", EventKind::Click, None, now - Duration::minutes(1)));

        let cutoff_5m = now - Duration::minutes(5);
        let cutoff_1h = now - Duration::hours(1);
        let cutoff_24h = now - Duration::hours(24);

        let us = store.activity_counts("m1", Some("US"), cutoff_5m, cutoff_1h, cutoff_24h);
        assert_eq!(us.views_1h, 1);

        let global = store.activity_counts("m1", None, cutoff_5m, cutoff_1h, cutoff_24h);
        assert_eq!(global.views_1h, 3);
    }

    #[test]
    fn test_active_geos_skip_unscoped_buckets() {
        let store = EventStore::new();
        let now = Utc::now();

        store.record(stored("u1", "m1", EventKind::Click, Some("US"), now));
        store.record(stored("u2", "m2", EventKind::Click, Some("UNKNOWN"), now));
        store.record(stored("u3", "m3", EventKind::Click, Some("LOCAL"), now));
        store.record(stored("u4", "m4", EventKind::Click, Some(""), now));

        let geos = store.active_geos(now - Duration::days(7));
        assert_eq!(geos, vec!["US".to_string()]);
    }

    #[test]
    fn test_user_event_count_can_exclude_impressions() {
        let store = EventStore::new();
        let now = Utc::now();

        store.record(stored("u1", "m1", EventKind::Click, None, now));
        store.record(stored("u1", "m2", EventKind::Impression, None, now));
        store.record(stored("u1", "m3", EventKind::Impression, None, now));

        let since = now - Duration::days(30);
        assert_eq!(store.user_event_count("u1", since, false), 3);
        assert_eq!(store.user_event_count("u1", since, true), 1);
    }

    #[test]
    fn test_prune_drops_old_events_and_empty_keys() {
        let store = EventStore::new();
        let now = Utc::now();

        store.record(stored("u1", "m1", EventKind::Click, Some("US"), now - Duration::days(40)));
        store.record(stored("u1", "m2", EventKind::Click, None, now));

        let removed = store.prune(now - Duration::days(30));
        assert_eq!(removed, 1);
        assert_eq!(store.event_count(), 1);
        assert!(store.active_item_ids(now - Duration::days(60)).contains(&"m2".to_string()));
        assert!(!store.active_item_ids(now - Duration::days(60)).contains(&"m1".to_string()));
        assert!(store.active_geos(now - Duration::days(60)).is_empty());
    }
}
