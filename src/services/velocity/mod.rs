// ============================================
// Velocity Service
// ============================================
//
// Batch recomputation of trending signals. Three passes, all idempotent:
// - rollups: view/trade counts per (active item x scope), scope by scope
// - odds changes: absolute move of the current probability against the
//   newest snapshot at or before each window's start
// - snapshots: one probability sample per open item for later baselines
//
// Rollups count from the raw event log every pass instead of adjusting
// counters in place, so a missed pass only delays freshness.

use crate::config::VelocityConfig;
use crate::models::{VelocityRollup, GLOBAL_GEO};
use crate::store::{CatalogError, EventStore, ItemCatalog, VelocityStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, VelocityError>;

#[derive(Debug, Error)]
pub enum VelocityError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RollupStats {
    pub active_items: usize,
    pub scopes: usize,
    pub rows_written: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OddsStats {
    pub items_checked: usize,
    pub items_moved: usize,
}

pub struct VelocityService {
    catalog: Arc<dyn ItemCatalog>,
    events: Arc<EventStore>,
    velocity: Arc<VelocityStore>,
    config: VelocityConfig,
}

impl VelocityService {
    pub fn new(
        catalog: Arc<dyn ItemCatalog>,
        events: Arc<EventStore>,
        velocity: Arc<VelocityStore>,
        config: VelocityConfig,
    ) -> Self {
        Self {
            catalog,
            events,
            velocity,
            config,
        }
    }

    /// Rebuild every trending scope from the event log. Items active
    /// anywhere in the last day get a row in every scope, zero counts
    /// included, so scope reads never confuse "no row" with "inactive
    /// here".
    pub fn compute_all_rollups(&self, now: DateTime<Utc>) -> RollupStats {
        let active_since = now - Duration::hours(self.config.active_item_window_hours);
        let geo_since = now - Duration::days(self.config.active_geo_window_days);

        let active_items = self.events.active_item_ids(active_since);
        let active_geos = self.events.active_geos(geo_since);

        let cutoff_5m = now - Duration::minutes(5);
        let cutoff_1h = now - Duration::hours(1);
        let cutoff_24h = now - Duration::hours(24);

        let mut stats = RollupStats {
            active_items: active_items.len(),
            scopes: 1 + active_geos.len(),
            rows_written: 0,
        };

        let mut scopes: Vec<(String, Option<String>)> = vec![(GLOBAL_GEO.to_string(), None)];
        scopes.extend(active_geos.iter().map(|g| (g.clone(), Some(g.clone()))));

        for (scope, geo_filter) in &scopes {
            let rows: Vec<VelocityRollup> = active_items
                .iter()
                .map(|item_id| {
                    let counts = self.events.activity_counts(
                        item_id,
                        geo_filter.as_deref(),
                        cutoff_5m,
                        cutoff_1h,
                        cutoff_24h,
                    );
                    let mut row = VelocityRollup::empty(item_id.clone(), scope.clone(), now);
                    row.views_5m = counts.views_5m;
                    row.views_1h = counts.views_1h;
                    row.views_24h = counts.views_24h;
                    row.trades_5m = counts.trades_5m;
                    row.trades_1h = counts.trades_1h;
                    row.trades_24h = counts.trades_24h;
                    row
                })
                .collect();
            stats.rows_written += rows.len();
            self.velocity.replace_scope(scope, rows);
        }

        self.velocity.retain_scopes(&active_geos);

        info!(
            active_items = stats.active_items,
            scopes = stats.scopes,
            rows = stats.rows_written,
            "velocity rollups recomputed"
        );
        stats
    }

    /// Recompute absolute probability deltas for every open item. A
    /// missing baseline (item younger than the window, or history
    /// pruned) reads as no movement.
    pub fn compute_odds_changes(&self, now: DateTime<Utc>) -> Result<OddsStats> {
        let short_cutoff = now - Duration::hours(self.config.odds_short_window_hours);
        let long_cutoff = now - Duration::hours(self.config.odds_long_window_hours);

        let mut stats = OddsStats::default();
        for item in self.catalog.open_items()? {
            stats.items_checked += 1;

            let change_1h = self
                .velocity
                .probability_at_or_before(&item.id, short_cutoff)
                .map(|baseline| (item.probability - baseline).abs())
                .unwrap_or(0.0);
            let change_24h = self
                .velocity
                .probability_at_or_before(&item.id, long_cutoff)
                .map(|baseline| (item.probability - baseline).abs())
                .unwrap_or(0.0);

            if change_1h != 0.0 || change_24h != 0.0 {
                stats.items_moved += 1;
            }
            self.velocity
                .apply_odds_change(&item.id, change_1h, change_24h, now);
        }

        debug!(
            items_checked = stats.items_checked,
            items_moved = stats.items_moved,
            "odds changes recomputed"
        );
        Ok(stats)
    }

    /// Sample the current probability of every open item.
    pub fn record_snapshots(&self, now: DateTime<Utc>) -> Result<usize> {
        let retention = Duration::days(self.config.snapshot_retention_days);
        let mut recorded = 0;
        for item in self.catalog.open_items()? {
            self.velocity
                .record_probability(&item.id, item.probability, now, retention);
            recorded += 1;
        }
        debug!(items = recorded, "probability snapshots recorded");
        Ok(recorded)
    }
}
