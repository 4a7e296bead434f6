// ============================================
// Velocity Store
// ============================================
//
// Rollup rows keyed by trending scope (GLOBAL plus each active geo), and
// a bounded probability history per item for odds-change deltas. Rollup
// refresh replaces a whole scope at once, so readers never observe a
// half-written scope.

use crate::models::{ProbabilitySnapshot, VelocityRollup, GLOBAL_GEO};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};

#[derive(Default)]
pub struct VelocityStore {
    scopes: DashMap<String, HashMap<String, VelocityRollup>>,
    history: DashMap<String, VecDeque<ProbabilitySnapshot>>,
}

impl VelocityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a freshly computed scope, discarding whatever rows the
    /// scope held before.
    pub fn replace_scope(&self, geo_bucket: &str, rows: Vec<VelocityRollup>) {
        let map: HashMap<String, VelocityRollup> = rows
            .into_iter()
            .map(|row| (row.item_id.clone(), row))
            .collect();
        self.scopes.insert(geo_bucket.to_string(), map);
    }

    /// Drop scopes that are no longer being recomputed.
    pub fn retain_scopes(&self, keep: &[String]) {
        self.scopes
            .retain(|geo, _| geo == GLOBAL_GEO || keep.iter().any(|k| k == geo));
    }

    pub fn rollup(&self, item_id: &str, geo_bucket: &str) -> Option<VelocityRollup> {
        self.scopes
            .get(geo_bucket)
            .and_then(|scope| scope.get(item_id).cloned())
    }

    /// Odds delta for an item, preferring the caller's scope and falling
    /// back to GLOBAL. Missing everywhere reads as no movement.
    pub fn odds_change_1h(&self, item_id: &str, geo_bucket: &str) -> f64 {
        if let Some(row) = self.rollup(item_id, geo_bucket) {
            if row.odds_change_1h != 0.0 {
                return row.odds_change_1h;
            }
        }
        self.rollup(item_id, GLOBAL_GEO)
            .map(|row| row.odds_change_1h)
            .unwrap_or(0.0)
    }

    /// Write odds deltas onto every scope row for the item. Items absent
    /// from all scopes get a GLOBAL row so the delta is never dropped.
    pub fn apply_odds_change(
        &self,
        item_id: &str,
        change_1h: f64,
        change_24h: f64,
        now: DateTime<Utc>,
    ) {
        let mut seen_global = false;
        for mut scope in self.scopes.iter_mut() {
            let is_global = scope.key() == GLOBAL_GEO;
            if let Some(row) = scope.value_mut().get_mut(item_id) {
                row.odds_change_1h = change_1h;
                row.odds_change_24h = change_24h;
                row.updated_at = now;
                if is_global {
                    seen_global = true;
                }
            }
        }

        if !seen_global {
            let mut row = VelocityRollup::empty(item_id, GLOBAL_GEO, now);
            row.odds_change_1h = change_1h;
            row.odds_change_24h = change_24h;
            self.scopes
                .entry(GLOBAL_GEO.to_string())
                .or_default()
                .insert(item_id.to_string(), row);
        }
    }

    /// Append a probability sample and drop samples past the retention
    /// horizon. History stays ordered because samples arrive from a
    /// single periodic job.
    pub fn record_probability(
        &self,
        item_id: &str,
        probability: f64,
        now: DateTime<Utc>,
        retention: Duration,
    ) {
        let mut history = self.history.entry(item_id.to_string()).or_default();
        history.push_back(ProbabilitySnapshot {
            probability,
            recorded_at: now,
        });
        let horizon = now - retention;
        while history.front().is_some_and(|s| s.recorded_at < horizon) {
            history.pop_front();
        }
    }

    /// Newest sample at or before `cutoff`, used as the baseline for
    /// odds-change deltas.
    pub fn probability_at_or_before(&self, item_id: &str, cutoff: DateTime<Utc>) -> Option<f64> {
        let history = self.history.get(item_id)?;
        history
            .iter()
            .rev()
            .find(|s| s.recorded_at <= cutoff)
            .map(|s| s.probability)
    }

    /// Sweep all histories, dropping samples older than `before`. Covers
    /// items that stopped receiving snapshots.
    pub fn prune_history(&self, before: DateTime<Utc>) -> u64 {
        let mut removed = 0u64;
        self.history.retain(|_, history| {
            let prior = history.len();
            history.retain(|s| s.recorded_at >= before);
            removed += (prior - history.len()) as u64;
            !history.is_empty()
        });
        removed
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn rollup_count(&self) -> usize {
        self.scopes.iter().map(|scope| scope.value().len()).sum()
    }
}
