// ============================================
// Scorer
// ============================================
//
// Multi-factor scoring for one (user, item, geo) triple:
//
//   Score = (Base * cooldown_mult * freq_mult) + changed_boost + owned_boost
//
// Base blends four 0-1 components. New users have no long-term signal
// yet, so their blend leans on trend and freshness instead:
//   new:   0.55*Trend + 0.30*ST + 0.15*Fresh
//   known: 0.45*LT + 0.25*ST + 0.20*Trend + 0.10*Fresh
//
// A recent hide overrides everything: the item scores 0 and carries only
// the "Hidden" tag. Every other input read here is a snapshot taken in
// `ScoreContext`, so scoring a full candidate set touches each store
// once, not once per item.

use crate::config::RankingConfig;
use crate::models::{
    ImpressionRecord, Item, ScoreBreakdown, ScoredItem, SessionWeights, GLOBAL_GEO,
};
use crate::services::impressions::ImpressionLedger;
use crate::services::session::SessionManager;
use crate::store::{AffinitySnapshot, AffinityStore, EventStore, VelocityStore};
use crate::utils::{exponential_decay, log1p_clamped, sigmoid};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

const SECONDS_PER_HOUR: f64 = 3_600.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Everything user-specific the scorer needs, prefetched once per
/// request.
pub struct ScoreContext {
    pub user_id: String,
    pub geo_bucket: String,
    pub now: DateTime<Utc>,
    pub new_user: bool,
    pub affinity: AffinitySnapshot,
    pub session: SessionWeights,
    pub impressions: HashMap<String, ImpressionRecord>,
}

pub struct Scorer {
    affinity: Arc<AffinityStore>,
    sessions: Arc<SessionManager>,
    events: Arc<EventStore>,
    velocity: Arc<VelocityStore>,
    impressions: Arc<ImpressionLedger>,
    config: RankingConfig,
}

impl Scorer {
    pub fn new(
        affinity: Arc<AffinityStore>,
        sessions: Arc<SessionManager>,
        events: Arc<EventStore>,
        velocity: Arc<VelocityStore>,
        impressions: Arc<ImpressionLedger>,
        config: RankingConfig,
    ) -> Self {
        Self {
            affinity,
            sessions,
            events,
            velocity,
            impressions,
            config,
        }
    }

    /// Users below the interaction threshold in the trailing window are
    /// "new" and scored without long-term affinity.
    pub fn is_new_user(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let since = now - Duration::days(self.config.scoring.classification_window_days);
        self.events.user_event_count(user_id, since, true) < self.config.scoring.new_user_threshold
    }

    /// Snapshot the user-side inputs for a scoring pass over `item_ids`.
    pub fn context(
        &self,
        user_id: &str,
        geo_bucket: &str,
        item_ids: &[String],
        now: DateTime<Utc>,
    ) -> ScoreContext {
        ScoreContext {
            user_id: user_id.to_string(),
            geo_bucket: geo_bucket.to_string(),
            now,
            new_user: self.is_new_user(user_id, now),
            affinity: self.affinity.snapshot(user_id, &self.config.affinity, now),
            session: self.sessions.get_weights(user_id, &self.config.session, now),
            impressions: self.impressions.get_batch(user_id, item_ids),
        }
    }

    /// Score one item against a prepared context.
    pub fn score(&self, item: &Item, ctx: &ScoreContext) -> ScoredItem {
        let exposure = ctx.impressions.get(&item.id).cloned().unwrap_or_default();

        let mut breakdown = ScoreBreakdown {
            long_term: if ctx.new_user {
                0.0
            } else {
                long_term_score(item, &ctx.affinity, &self.config)
            },
            short_term: short_term_score(item, &ctx.session, &self.config),
            trend: self.trend_score(item, &ctx.geo_bucket),
            freshness: self.fresh_score(item, ctx.now),
            ..ScoreBreakdown::default()
        };

        if self.hidden_recently(&exposure, ctx.now) {
            return ScoredItem {
                item_id: item.id.clone(),
                score: 0.0,
                reason_tags: vec!["Hidden".to_string()],
                breakdown,
            };
        }

        let weights = &self.config.scoring;
        breakdown.base = if ctx.new_user {
            weights.new_user.trend_weight * breakdown.trend
                + weights.new_user.session_weight * breakdown.short_term
                + weights.new_user.fresh_weight * breakdown.freshness
        } else {
            weights.known_user.long_term_weight * breakdown.long_term
                + weights.known_user.session_weight * breakdown.short_term
                + weights.known_user.trend_weight * breakdown.trend
                + weights.known_user.fresh_weight * breakdown.freshness
        };

        breakdown.cooldown_mult = self.cooldown_mult(exposure.last_shown_at, ctx.now);
        breakdown.frequency_mult = self.frequency_mult(exposure.impressions_24h);

        let changed = self.is_changed(item, &ctx.geo_bucket, ctx.now);
        if changed {
            let floors = &self.config.changed;
            breakdown.cooldown_mult = breakdown.cooldown_mult.max(floors.cooldown_floor);
            breakdown.frequency_mult = breakdown.frequency_mult.max(floors.freq_floor);
            breakdown.changed_boost = floors.boost;
        }

        let owned = self.owned_recently(&exposure, ctx.now);
        if owned {
            breakdown.owned_boost = self.config.bonuses.owned_boost;
        }

        let score = breakdown.base * breakdown.cooldown_mult * breakdown.frequency_mult
            + breakdown.changed_boost
            + breakdown.owned_boost;

        let mut reason_tags = Vec::new();
        if ctx.new_user {
            reason_tags.push("NewUser".to_string());
        }
        if breakdown.long_term > 0.5 {
            reason_tags.push("LT:Match".to_string());
        }
        if breakdown.short_term > 0.5 {
            reason_tags.push("ST:Match".to_string());
        }
        if breakdown.trend > 0.5 {
            reason_tags.push("Trend:High".to_string());
        }
        if breakdown.freshness > 0.7 {
            reason_tags.push("Fresh".to_string());
        }
        if changed {
            reason_tags.push("Changed".to_string());
        }
        if owned {
            reason_tags.push("Owned".to_string());
        }
        if breakdown.cooldown_mult < 1.0 {
            reason_tags.push(format!("Cooldown:{:.2}", breakdown.cooldown_mult));
        }
        if breakdown.frequency_mult < 1.0 {
            reason_tags.push(format!("Freq:{:.2}", breakdown.frequency_mult));
        }

        ScoredItem {
            item_id: item.id.clone(),
            score,
            reason_tags,
            breakdown,
        }
    }

    /// Global/local blend of the sigmoid-squashed 1h velocity.
    fn trend_score(&self, item: &Item, geo_bucket: &str) -> f64 {
        let weights = &self.config.scoring;

        let global = self.channel_heat(&item.id, GLOBAL_GEO);
        let local = if geo_bucket == GLOBAL_GEO {
            global
        } else {
            self.channel_heat(&item.id, geo_bucket)
        };

        weights.trend_global_weight * global + weights.trend_local_weight * local
    }

    fn channel_heat(&self, item_id: &str, geo_bucket: &str) -> f64 {
        let (trades, views) = self
            .velocity
            .rollup(item_id, geo_bucket)
            .map(|row| (row.trades_1h, row.views_1h))
            .unwrap_or((0, 0));
        let weights = &self.config.scoring;
        sigmoid(
            weights.trend_trades_weight * log1p_clamped(trades as f64)
                + weights.trend_views_weight * log1p_clamped(views as f64),
        )
    }

    fn fresh_score(&self, item: &Item, now: DateTime<Utc>) -> f64 {
        exponential_decay(item.age_hours(now), self.config.scoring.freshness_decay_hours)
    }

    fn cooldown_mult(&self, last_shown_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        let Some(last_shown) = last_shown_at else {
            return 1.0;
        };
        let hours_since = (now - last_shown).num_seconds() as f64 / SECONDS_PER_HOUR;
        let tiers = &self.config.penalties.cooldown;
        if hours_since < 2.0 {
            tiers.under_2h
        } else if hours_since < 6.0 {
            tiers.under_6h
        } else if hours_since < 24.0 {
            tiers.under_24h
        } else {
            tiers.rested
        }
    }

    fn frequency_mult(&self, impressions_24h: u32) -> f64 {
        let tiers = &self.config.penalties.frequency;
        match impressions_24h {
            0 => tiers.zero,
            1 => tiers.one,
            2 => tiers.two,
            3 => tiers.three,
            _ => tiers.four_plus,
        }
    }

    fn is_changed(&self, item: &Item, geo_bucket: &str, now: DateTime<Utc>) -> bool {
        let changed = &self.config.changed;

        let odds_moved =
            self.velocity.odds_change_1h(&item.id, geo_bucket) >= changed.odds_change_threshold;

        let ending_soon = item.resolution_at.is_some_and(|resolves| {
            let hours_left = (resolves - now).num_seconds() as f64 / SECONDS_PER_HOUR;
            hours_left <= changed.ending_soon_hours
        });

        odds_moved || ending_soon
    }

    fn hidden_recently(&self, exposure: &ImpressionRecord, now: DateTime<Utc>) -> bool {
        exposure.last_hidden_at.is_some_and(|hidden| {
            let days_since = (now - hidden).num_seconds() as f64 / SECONDS_PER_DAY;
            days_since < self.config.penalties.hide_suppression_days
        })
    }

    fn owned_recently(&self, exposure: &ImpressionRecord, now: DateTime<Utc>) -> bool {
        exposure.last_traded_at.is_some_and(|traded| {
            let days_since = (now - traded).num_seconds() as f64 / SECONDS_PER_DAY;
            days_since < self.config.bonuses.owned_days
        })
    }
}

/// Category/tag similarity against long-term affinity, capped at 1.0.
pub fn long_term_score(item: &Item, affinity: &AffinitySnapshot, config: &RankingConfig) -> f64 {
    let weights = &config.scoring;
    let mut score = 0.0;

    if let Some(&weight) = affinity.categories.get(&item.category) {
        score += weight * weights.lt_category_weight;
    }
    for tag in &item.tags {
        if let Some(&weight) = affinity.tags.get(tag) {
            score += weight * weights.lt_tag_weight;
        }
    }

    score.min(1.0)
}

/// Category/tag similarity against the active session, each weight
/// normalized by its map's current max so the top session interest
/// reads as 1.0.
pub fn short_term_score(item: &Item, session: &SessionWeights, config: &RankingConfig) -> f64 {
    let weights = &config.scoring;
    let mut score = 0.0;

    if let Some(&weight) = session.category_weights.get(&item.category) {
        let max_weight = session
            .category_weights
            .values()
            .copied()
            .fold(f64::MIN, f64::max);
        score += (weight / max_weight.max(1.0)) * weights.st_category_weight;
    }

    if !session.tag_weights.is_empty() {
        let max_weight = session
            .tag_weights
            .values()
            .copied()
            .fold(f64::MIN, f64::max);
        for tag in &item.tags {
            if let Some(&weight) = session.tag_weights.get(tag) {
                score += (weight / max_weight.max(1.0)) * weights.st_tag_weight;
            }
        }
    }

    score.min(1.0)
}
