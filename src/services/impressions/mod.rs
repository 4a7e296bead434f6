// ============================================
// Impression Ledger
// ============================================
//
// Per-(user, item) exposure state driving cooldown, frequency capping,
// and hide suppression. Serving a feed logs one impression per delivered
// item and also appends a zero-weight synthetic event, so rollups can
// count exposure volume without it polluting preference learning.
//
// The 24h/7d counters are approximate by design: a maintenance pass
// zeroes a counter once the row's last exposure falls out of the window,
// rather than tracking each impression's age.

use crate::models::{EventInput, EventKind, ExposureKind, ImpressionRecord, StoredEvent};
use crate::store::EventStore;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub struct ImpressionLedger {
    records: DashMap<(String, String), ImpressionRecord>,
    events: Arc<EventStore>,
}

impl ImpressionLedger {
    pub fn new(events: Arc<EventStore>) -> Self {
        Self {
            records: DashMap::new(),
            events,
        }
    }

    /// Record one delivered feed page: bump both counters and refresh
    /// `last_shown_at` for every item, and append the synthetic
    /// impression events.
    pub fn log_impressions(
        &self,
        user_id: &str,
        item_ids: &[String],
        geo_bucket: Option<&str>,
        now: DateTime<Utc>,
    ) {
        for item_id in item_ids {
            let mut record = self
                .records
                .entry((user_id.to_string(), item_id.clone()))
                .or_default();
            record.impressions_24h += 1;
            record.impressions_7d += 1;
            record.last_shown_at = Some(now);
            drop(record);

            let mut input = EventInput::new(user_id, item_id.clone(), EventKind::Impression);
            input.geo_bucket = geo_bucket.map(|g| g.to_string());
            self.events.record(StoredEvent::from_input(input, now));
        }

        debug!(
            user_id = %user_id,
            item_count = item_ids.len(),
            "impressions logged"
        );
    }

    /// Stamp the exposure timestamp a click, trade, or hide updates.
    pub fn update_timestamp(
        &self,
        user_id: &str,
        item_id: &str,
        kind: ExposureKind,
        now: DateTime<Utc>,
    ) {
        let mut record = self
            .records
            .entry((user_id.to_string(), item_id.to_string()))
            .or_default();
        match kind {
            ExposureKind::Click => record.last_clicked_at = Some(now),
            ExposureKind::Trade => record.last_traded_at = Some(now),
            ExposureKind::Hide => record.last_hidden_at = Some(now),
        }
    }

    /// Exposure row for one (user, item) pair. Missing rows read as
    /// all-zero.
    pub fn get(&self, user_id: &str, item_id: &str) -> ImpressionRecord {
        self.records
            .get(&(user_id.to_string(), item_id.to_string()))
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Batch fetch for a candidate set, one map lookup per item.
    pub fn get_batch(
        &self,
        user_id: &str,
        item_ids: &[String],
    ) -> HashMap<String, ImpressionRecord> {
        let mut out = HashMap::with_capacity(item_ids.len());
        for item_id in item_ids {
            if let Some(entry) = self.records.get(&(user_id.to_string(), item_id.clone())) {
                out.insert(item_id.clone(), entry.value().clone());
            }
        }
        out
    }

    /// Items the user hid within the suppression window, for candidate
    /// pre-exclusion.
    pub fn hidden_item_ids(
        &self,
        user_id: &str,
        suppression: Duration,
        now: DateTime<Utc>,
    ) -> HashSet<String> {
        self.records
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .filter(|entry| {
                entry
                    .value()
                    .last_hidden_at
                    .is_some_and(|hidden| now - hidden < suppression)
            })
            .map(|entry| entry.key().1.clone())
            .collect()
    }

    /// Zero counters whose window has fully elapsed since the last
    /// exposure. Returns how many rows were touched.
    pub fn roll_counters(&self, now: DateTime<Utc>) -> u64 {
        let mut touched = 0u64;
        for mut entry in self.records.iter_mut() {
            let record = entry.value_mut();
            let Some(last_shown) = record.last_shown_at else {
                continue;
            };

            let mut changed = false;
            if record.impressions_24h > 0 && now - last_shown > Duration::hours(24) {
                record.impressions_24h = 0;
                changed = true;
            }
            if record.impressions_7d > 0 && now - last_shown > Duration::days(7) {
                record.impressions_7d = 0;
                changed = true;
            }
            if changed {
                touched += 1;
            }
        }
        touched
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ImpressionLedger {
        ImpressionLedger::new(Arc::new(EventStore::new()))
    }

    #[test]
    fn test_log_impressions_counts_each_delivery() {
        let ledger = ledger();
        let now = Utc::now();
        let items = vec!["m1".to_string(), "m2".to_string()];

        ledger.log_impressions("u1", &items, Some("US"), now);
        ledger.log_impressions("u1", &["m1".to_string()], Some("US"), now + Duration::minutes(5));

        let m1 = ledger.get("u1", "m1");
        assert_eq!(m1.impressions_24h, 2);
        assert_eq!(m1.impressions_7d, 2);
        assert_eq!(m1.last_shown_at, Some(now + Duration::minutes(5)));

        let m2 = ledger.get("u1", "m2");
        assert_eq!(m2.impressions_24h, 1);
    }

    #[test]
    fn test_log_impressions_appends_synthetic_events() {
        let events = Arc::new(EventStore::new());
        let ledger = ImpressionLedger::new(Arc::clone(&events));
        let now = Utc::now();

        ledger.log_impressions("u1", &["m1".to_string(), "m2".to_string()], None, now);

        assert_eq!(events.event_count(), 2);
        // Synthetic impressions never count toward user maturity.
        assert_eq!(events.user_event_count("u1", now - Duration::days(1), true), 0);
    }

    #[test]
    fn test_missing_row_reads_as_zeros() {
        let ledger = ledger();
        let record = ledger.get("u1", "never-shown");
        assert_eq!(record.impressions_24h, 0);
        assert!(record.last_shown_at.is_none());
    }

    #[test]
    fn test_update_timestamp_routes_by_kind() {
        let ledger = ledger();
        let now = Utc::now();

        ledger.update_timestamp("u1", "m1", ExposureKind::Click, now);
        ledger.update_timestamp("u1", "m1", ExposureKind::Trade, now + Duration::minutes(1));
        ledger.update_timestamp("u1", "m1", ExposureKind::Hide, now + Duration::minutes(2));

        let record = ledger.get("u1", "m1");
        assert_eq!(record.last_clicked_at, Some(now));
        assert_eq!(record.last_traded_at, Some(now + Duration::minutes(1)));
        assert_eq!(record.last_hidden_at, Some(now + Duration::minutes(2)));
    }

    #[test]
    fn test_hidden_item_ids_respects_window() {
        let ledger = ledger();
        let now = Utc::now();

        ledger.update_timestamp("u1", "recent", ExposureKind::Hide, now - Duration::days(3));
        ledger.update_timestamp("u1", "old", ExposureKind::Hide, now - Duration::days(20));
        ledger.update_timestamp("u2", "other-user", ExposureKind::Hide, now);

        let hidden = ledger.hidden_item_ids("u1", Duration::days(14), now);
        assert_eq!(hidden.len(), 1);
        assert!(hidden.contains("recent"));
    }

    #[test]
    fn test_roll_counters_zeroes_stale_windows() {
        let ledger = ledger();
        let now = Utc::now();

        ledger.log_impressions("u1", &["day-old".to_string()], None, now - Duration::hours(30));
        ledger.log_impressions("u1", &["week-old".to_string()], None, now - Duration::days(8));
        ledger.log_impressions("u1", &["fresh".to_string()], None, now - Duration::hours(1));

        let touched = ledger.roll_counters(now);
        assert_eq!(touched, 2);

        let day_old = ledger.get("u1", "day-old");
        assert_eq!(day_old.impressions_24h, 0);
        assert_eq!(day_old.impressions_7d, 1);

        let week_old = ledger.get("u1", "week-old");
        assert_eq!(week_old.impressions_24h, 0);
        assert_eq!(week_old.impressions_7d, 0);

        assert_eq!(ledger.get("u1", "fresh").impressions_24h, 1);
    }
}
