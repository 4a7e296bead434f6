use serde::{Deserialize, Serialize};
use std::env;

use crate::models::Channel;

/// Full engine configuration. Every tunable in the ranking pipeline lives
/// here; the engine treats the active config as a swappable snapshot, so a
/// new document can be applied without restarting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub scoring: ScoringConfig,
    pub affinity: AffinityConfig,
    pub session: SessionConfig,
    pub penalties: PenaltyConfig,
    pub changed: ChangedConfig,
    pub bonuses: BonusConfig,
    pub pools: PoolConfig,
    pub quotas: QuotaConfig,
    pub diversity: DiversityConfig,
    pub velocity: VelocityConfig,
    pub composer: ComposerConfig,
    pub jobs: JobConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Users with fewer non-impression interactions than this inside the
    /// classification window are scored as "new".
    pub new_user_threshold: u64,
    pub classification_window_days: i64,
    pub lt_category_weight: f64,
    pub lt_tag_weight: f64,
    pub st_category_weight: f64,
    pub st_tag_weight: f64,
    pub trend_trades_weight: f64,
    pub trend_views_weight: f64,
    pub trend_global_weight: f64,
    pub trend_local_weight: f64,
    pub freshness_decay_hours: f64,
    pub new_user: NewUserWeights,
    pub known_user: KnownUserWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewUserWeights {
    pub trend_weight: f64,
    pub session_weight: f64,
    pub fresh_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnownUserWeights {
    pub long_term_weight: f64,
    pub session_weight: f64,
    pub trend_weight: f64,
    pub fresh_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityConfig {
    /// e-folding scale of raw-score decay, in days.
    pub decay_days: f64,
    pub category_multiplier: f64,
    pub tag_multiplier: f64,
    /// Midpoint of the 0-100 logistic normalization.
    pub logistic_midpoint: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_minutes: i64,
    pub max_lifetime_hours: i64,
    pub decay_multiplier: f64,
    /// Tags receive this fraction of the event weight a category receives.
    pub tag_event_multiplier: f64,
    pub max_tags: usize,
    pub max_categories: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    pub cooldown: CooldownTiers,
    pub frequency: FrequencyTiers,
    pub hide_suppression_days: f64,
}

/// Multiplier by time since the item was last shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownTiers {
    pub under_2h: f64,
    pub under_6h: f64,
    pub under_24h: f64,
    pub rested: f64,
}

/// Multiplier by 24h impression count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyTiers {
    pub zero: f64,
    pub one: f64,
    pub two: f64,
    pub three: f64,
    pub four_plus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangedConfig {
    pub odds_change_threshold: f64,
    pub ending_soon_hours: f64,
    pub cooldown_floor: f64,
    pub freq_floor: f64,
    pub boost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BonusConfig {
    pub owned_days: f64,
    pub owned_boost: f64,
}

/// Oversized per-channel candidate pool sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub personal: usize,
    pub trending_global: usize,
    pub trending_local: usize,
    pub fresh_new: usize,
    pub exploration: usize,
    /// Per-channel category cap as a share of the channel pool size.
    pub category_cap_share: f64,
    pub fresh_max_age_hours: f64,
    pub fresh_min_volume_24h: f64,
    pub exploration_min_volume_total: f64,
}

impl PoolConfig {
    pub fn for_channel(&self, channel: Channel) -> usize {
        match channel {
            Channel::Personal => self.personal,
            Channel::TrendingGlobal => self.trending_global,
            Channel::TrendingLocal => self.trending_local,
            Channel::FreshNew => self.fresh_new,
            Channel::Exploration => self.exploration,
        }
    }

    pub fn total(&self) -> usize {
        self.personal + self.trending_global + self.trending_local + self.fresh_new + self.exploration
    }
}

/// Feed-length percentage split across channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub personal: f64,
    pub trending_global: f64,
    pub trending_local: f64,
    pub fresh_new: f64,
    pub exploration: f64,
}

impl QuotaConfig {
    pub fn share(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Personal => self.personal,
            Channel::TrendingGlobal => self.trending_global,
            Channel::TrendingLocal => self.trending_local,
            Channel::FreshNew => self.fresh_new,
            Channel::Exploration => self.exploration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityConfig {
    pub max_category_share: f64,
    pub max_consecutive: usize,
    pub max_tag_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Items with any event inside this window get rollup rows.
    pub active_item_window_hours: i64,
    /// Geo buckets with any event inside this window get their own scope.
    pub active_geo_window_days: i64,
    pub snapshot_retention_days: i64,
    pub odds_short_window_hours: i64,
    pub odds_long_window_hours: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Scored candidates below this are dropped before quota selection.
    pub min_score: f64,
    /// Universe and merge oversize multiplier ahead of the diversity pass.
    pub oversize_factor: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub rollup_interval_secs: u64,
    pub snapshot_interval_secs: u64,
    pub maintenance_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub event_retention_days: i64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            affinity: AffinityConfig::default(),
            session: SessionConfig::default(),
            penalties: PenaltyConfig::default(),
            changed: ChangedConfig::default(),
            bonuses: BonusConfig::default(),
            pools: PoolConfig::default(),
            quotas: QuotaConfig::default(),
            diversity: DiversityConfig::default(),
            velocity: VelocityConfig::default(),
            composer: ComposerConfig::default(),
            jobs: JobConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            new_user_threshold: 10,
            classification_window_days: 30,
            lt_category_weight: 0.5,
            lt_tag_weight: 0.3,
            st_category_weight: 0.5,
            st_tag_weight: 0.3,
            trend_trades_weight: 0.7,
            trend_views_weight: 0.3,
            trend_global_weight: 0.7,
            trend_local_weight: 0.3,
            freshness_decay_hours: 72.0,
            new_user: NewUserWeights::default(),
            known_user: KnownUserWeights::default(),
        }
    }
}

impl Default for NewUserWeights {
    fn default() -> Self {
        Self {
            trend_weight: 0.55,
            session_weight: 0.30,
            fresh_weight: 0.15,
        }
    }
}

impl Default for KnownUserWeights {
    fn default() -> Self {
        Self {
            long_term_weight: 0.45,
            session_weight: 0.25,
            trend_weight: 0.20,
            fresh_weight: 0.10,
        }
    }
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            decay_days: 30.0,
            category_multiplier: 0.35,
            tag_multiplier: 0.30,
            logistic_midpoint: 5.0,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: 60,
            max_lifetime_hours: 2,
            decay_multiplier: 0.90,
            tag_event_multiplier: 0.8,
            max_tags: 50,
            max_categories: 20,
        }
    }
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            cooldown: CooldownTiers::default(),
            frequency: FrequencyTiers::default(),
            hide_suppression_days: 14.0,
        }
    }
}

impl Default for CooldownTiers {
    fn default() -> Self {
        Self {
            under_2h: 0.10,
            under_6h: 0.35,
            under_24h: 0.70,
            rested: 1.00,
        }
    }
}

impl Default for FrequencyTiers {
    fn default() -> Self {
        Self {
            zero: 1.00,
            one: 0.80,
            two: 0.60,
            three: 0.40,
            four_plus: 0.25,
        }
    }
}

impl Default for ChangedConfig {
    fn default() -> Self {
        Self {
            odds_change_threshold: 0.03,
            ending_soon_hours: 6.0,
            cooldown_floor: 0.70,
            freq_floor: 0.60,
            boost: 0.15,
        }
    }
}

impl Default for BonusConfig {
    fn default() -> Self {
        Self {
            owned_days: 3.0,
            owned_boost: 0.10,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            personal: 120,
            trending_global: 80,
            trending_local: 50,
            fresh_new: 30,
            exploration: 20,
            category_cap_share: 0.15,
            fresh_max_age_hours: 72.0,
            fresh_min_volume_24h: 100.0,
            exploration_min_volume_total: 1000.0,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            personal: 0.40,
            trending_global: 0.25,
            trending_local: 0.12,
            fresh_new: 0.08,
            exploration: 0.15,
        }
    }
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            max_category_share: 0.35,
            max_consecutive: 2,
            max_tag_share: 0.30,
        }
    }
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            active_item_window_hours: 24,
            active_geo_window_days: 7,
            snapshot_retention_days: 7,
            odds_short_window_hours: 1,
            odds_long_window_hours: 24,
        }
    }
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            min_score: 0.01,
            oversize_factor: 2,
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            rollup_interval_secs: 120,
            snapshot_interval_secs: 600,
            maintenance_interval_secs: 3600,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            event_retention_days: 30,
        }
    }
}

impl RankingConfig {
    /// Load defaults with environment overrides for the operational tunables.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        config.scoring.new_user_threshold = env::var("NEW_USER_THRESHOLD")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .expect("NEW_USER_THRESHOLD must be a valid u64");
        config.scoring.freshness_decay_hours = env::var("FRESHNESS_DECAY_HOURS")
            .unwrap_or_else(|_| "72.0".to_string())
            .parse()
            .expect("FRESHNESS_DECAY_HOURS must be a valid f64");
        config.session.idle_timeout_minutes = env::var("SESSION_IDLE_TIMEOUT_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .expect("SESSION_IDLE_TIMEOUT_MINUTES must be a valid i64");
        config.session.max_lifetime_hours = env::var("SESSION_MAX_LIFETIME_HOURS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .expect("SESSION_MAX_LIFETIME_HOURS must be a valid i64");
        config.penalties.hide_suppression_days = env::var("HIDE_SUPPRESSION_DAYS")
            .unwrap_or_else(|_| "14.0".to_string())
            .parse()
            .expect("HIDE_SUPPRESSION_DAYS must be a valid f64");
        config.changed.odds_change_threshold = env::var("ODDS_CHANGE_THRESHOLD")
            .unwrap_or_else(|_| "0.03".to_string())
            .parse()
            .expect("ODDS_CHANGE_THRESHOLD must be a valid f64");
        config.changed.boost = env::var("CHANGED_BOOST")
            .unwrap_or_else(|_| "0.15".to_string())
            .parse()
            .expect("CHANGED_BOOST must be a valid f64");
        config.bonuses.owned_boost = env::var("OWNED_BOOST")
            .unwrap_or_else(|_| "0.10".to_string())
            .parse()
            .expect("OWNED_BOOST must be a valid f64");
        config.composer.min_score = env::var("MIN_FEED_SCORE")
            .unwrap_or_else(|_| "0.01".to_string())
            .parse()
            .expect("MIN_FEED_SCORE must be a valid f64");
        config.jobs.rollup_interval_secs = env::var("ROLLUP_INTERVAL_SECS")
            .unwrap_or_else(|_| "120".to_string())
            .parse()
            .expect("ROLLUP_INTERVAL_SECS must be a valid u64");
        config.jobs.snapshot_interval_secs = env::var("SNAPSHOT_INTERVAL_SECS")
            .unwrap_or_else(|_| "600".to_string())
            .parse()
            .expect("SNAPSHOT_INTERVAL_SECS must be a valid u64");
        config.jobs.maintenance_interval_secs = env::var("MAINTENANCE_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .expect("MAINTENANCE_INTERVAL_SECS must be a valid u64");
        config.maintenance.event_retention_days = env::var("EVENT_RETENTION_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .expect("EVENT_RETENTION_DAYS must be a valid i64");

        Ok(config)
    }

    /// Parse a full or partial config document. Missing sections and fields
    /// fall back to defaults, so a hot-swap payload only has to carry the
    /// values it changes.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
