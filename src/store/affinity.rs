// ============================================
// Affinity Store
// ============================================
//
// Long-term topic preferences per user. Each row holds a decaying raw
// accumulator plus its logistic 0-100 projection. Decay is evaluated
// lazily: writes fold elapsed decay into the stored row, reads apply it
// on the fly without mutating anything.

use crate::config::AffinityConfig;
use crate::models::{TopicAffinity, TopicType};
use crate::utils::{exponential_decay, sigmoid};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::HashMap;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Per-user affinity maps normalized to 0-1, keyed by topic value.
#[derive(Debug, Clone, Default)]
pub struct AffinitySnapshot {
    pub categories: HashMap<String, f64>,
    pub tags: HashMap<String, f64>,
}

impl AffinitySnapshot {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.tags.is_empty()
    }
}

#[derive(Default)]
pub struct AffinityStore {
    rows: DashMap<String, HashMap<(TopicType, String), TopicAffinity>>,
}

impl AffinityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold elapsed decay into a row, add `delta`, and refresh the
    /// logistic score. Creates the row on first touch.
    pub fn apply_delta(
        &self,
        user_id: &str,
        topic_type: TopicType,
        topic_value: &str,
        delta: f64,
        config: &AffinityConfig,
        now: DateTime<Utc>,
    ) {
        let mut user_rows = self.rows.entry(user_id.to_string()).or_default();
        let row = user_rows
            .entry((topic_type, topic_value.to_string()))
            .or_insert_with(|| TopicAffinity {
                topic_type,
                topic_value: topic_value.to_string(),
                raw_score: 0.0,
                score: 0.0,
                interaction_count: 0,
                last_updated: now,
            });

        row.raw_score = decayed_raw(row, config, now) + delta;
        row.score = logistic_score(row.raw_score, config.logistic_midpoint);
        row.interaction_count += 1;
        row.last_updated = now;
    }

    /// One row with decay applied as of `now`. The stored row is left
    /// untouched.
    pub fn get(
        &self,
        user_id: &str,
        topic_type: TopicType,
        topic_value: &str,
        config: &AffinityConfig,
        now: DateTime<Utc>,
    ) -> Option<TopicAffinity> {
        let user_rows = self.rows.get(user_id)?;
        let row = user_rows.get(&(topic_type, topic_value.to_string()))?;
        Some(decayed_view(row, config, now))
    }

    /// All of a user's affinities as 0-1 weights, decayed as of `now`.
    pub fn snapshot(
        &self,
        user_id: &str,
        config: &AffinityConfig,
        now: DateTime<Utc>,
    ) -> AffinitySnapshot {
        let mut snapshot = AffinitySnapshot::default();
        let Some(user_rows) = self.rows.get(user_id) else {
            return snapshot;
        };

        for row in user_rows.values() {
            let view = decayed_view(row, config, now);
            let weight = view.score / 100.0;
            match view.topic_type {
                TopicType::Category => {
                    snapshot.categories.insert(view.topic_value, weight);
                }
                TopicType::Tag => {
                    snapshot.tags.insert(view.topic_value, weight);
                }
            }
        }

        snapshot
    }

    /// Strongest affinities of one type, decayed as of `now`, highest
    /// score first.
    pub fn top_topics(
        &self,
        user_id: &str,
        topic_type: TopicType,
        limit: usize,
        config: &AffinityConfig,
        now: DateTime<Utc>,
    ) -> Vec<TopicAffinity> {
        let Some(user_rows) = self.rows.get(user_id) else {
            return Vec::new();
        };

        let mut rows: Vec<TopicAffinity> = user_rows
            .values()
            .filter(|row| row.topic_type == topic_type)
            .map(|row| decayed_view(row, config, now))
            .collect();
        rows.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        rows.truncate(limit);
        rows
    }

    pub fn user_count(&self) -> usize {
        self.rows.len()
    }
}

fn decayed_raw(row: &TopicAffinity, config: &AffinityConfig, now: DateTime<Utc>) -> f64 {
    let elapsed_days =
        ((now - row.last_updated).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
    row.raw_score * exponential_decay(elapsed_days, config.decay_days)
}

fn decayed_view(row: &TopicAffinity, config: &AffinityConfig, now: DateTime<Utc>) -> TopicAffinity {
    let raw = decayed_raw(row, config, now);
    TopicAffinity {
        raw_score: raw,
        score: logistic_score(raw, config.logistic_midpoint),
        ..row.clone()
    }
}

fn logistic_score(raw: f64, midpoint: f64) -> f64 {
    100.0 * sigmoid(raw - midpoint)
}
