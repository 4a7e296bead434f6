use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Scope name for rollups that aggregate activity across every geo bucket.
pub const GLOBAL_GEO: &str = "GLOBAL";

/// A rankable content item. Owned and mutated by the catalog owner; the
/// engine only reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub category: String,
    pub tags: Vec<String>,
    pub probability: f64,
    pub volume_24h: f64,
    pub volume_total: f64,
    pub created_at: DateTime<Utc>,
    pub resolution_at: Option<DateTime<Utc>>,
    pub status: ItemStatus,
}

impl Item {
    pub fn is_open(&self) -> bool {
        self.status == ItemStatus::Open
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds() as f64 / 3600.0
    }

    /// Primary tag, used for the diversity tag cap.
    pub fn top_tag(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Open,
    Closed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Interaction event kinds. Closed set: an unrecognized kind fails at
/// construction instead of silently defaulting to some weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Participate,
    ParticipateIntent,
    Share,
    Comment,
    Bookmark,
    Click,
    #[serde(rename = "view_market")]
    View,
    ReturnVisit,
    #[serde(rename = "dwell_30+")]
    DwellLong,
    #[serde(rename = "dwell_5+")]
    DwellShort,
    ScrollPast,
    SkipFast,
    Hide,
    Impression,
}

impl EventKind {
    /// Base affinity weight for this event kind.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Participate => 6.0,
            Self::ParticipateIntent => 3.0,
            Self::Share => 4.0,
            Self::Comment => 4.5,
            Self::Bookmark => 3.5,
            Self::Click => 2.0,
            Self::View => 2.0,
            Self::ReturnVisit => 3.0,
            Self::DwellLong => 2.0,
            Self::DwellShort => 1.0,
            Self::ScrollPast => -0.5,
            Self::SkipFast => -1.0,
            Self::Hide => -6.0,
            Self::Impression => 0.0,
        }
    }

    /// View-class events feed the `views_*` rollup counters.
    pub fn is_view_class(&self) -> bool {
        matches!(self, Self::Impression | Self::Click | Self::View)
    }

    /// Synthetic exposure marker, excluded from user maturity counts.
    pub fn is_impression(&self) -> bool {
        matches!(self, Self::Impression)
    }

    /// Trade-class events feed the `trades_*` rollup counters.
    pub fn is_trade_class(&self) -> bool {
        matches!(self, Self::Participate | Self::ParticipateIntent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Participate => "participate",
            Self::ParticipateIntent => "participate_intent",
            Self::Share => "share",
            Self::Comment => "comment",
            Self::Bookmark => "bookmark",
            Self::Click => "click",
            Self::View => "view_market",
            Self::ReturnVisit => "return_visit",
            Self::DwellLong => "dwell_30+",
            Self::DwellShort => "dwell_5+",
            Self::ScrollPast => "scroll_past",
            Self::SkipFast => "skip_fast",
            Self::Hide => "hide",
            Self::Impression => "impression",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "participate" => Ok(Self::Participate),
            "participate_intent" => Ok(Self::ParticipateIntent),
            "share" => Ok(Self::Share),
            "comment" => Ok(Self::Comment),
            "bookmark" => Ok(Self::Bookmark),
            "click" => Ok(Self::Click),
            "view_market" => Ok(Self::View),
            "return_visit" => Ok(Self::ReturnVisit),
            "dwell_30+" => Ok(Self::DwellLong),
            "dwell_5+" => Ok(Self::DwellShort),
            "scroll_past" => Ok(Self::ScrollPast),
            "skip_fast" => Ok(Self::SkipFast),
            "hide" => Ok(Self::Hide),
            "impression" => Ok(Self::Impression),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

/// An event as submitted by the ingestion edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInput {
    pub user_id: String,
    pub item_id: String,
    pub kind: EventKind,
    #[serde(default)]
    pub dwell_ms: Option<u64>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub geo_bucket: Option<String>,
}

impl EventInput {
    pub fn new(
        user_id: impl Into<String>,
        item_id: impl Into<String>,
        kind: EventKind,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: item_id.into(),
            kind,
            dwell_ms: None,
            section: None,
            position: None,
            geo_bucket: None,
        }
    }

    pub fn with_dwell_ms(mut self, dwell_ms: u64) -> Self {
        self.dwell_ms = Some(dwell_ms);
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_geo_bucket(mut self, geo_bucket: impl Into<String>) -> Self {
        self.geo_bucket = Some(geo_bucket.into());
        self
    }

    /// Event weight after dwell scaling. A reported dwell scales the base
    /// weight by `min(1, dwell_ms / 60_000)`.
    pub fn effective_weight(&self) -> f64 {
        let base = self.kind.weight();
        match self.dwell_ms {
            Some(ms) => base * (ms as f64 / 60_000.0).min(1.0),
            None => base,
        }
    }
}

/// A recorded, immutable interaction event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub user_id: String,
    pub item_id: String,
    pub kind: EventKind,
    pub ts: DateTime<Utc>,
    pub dwell_ms: Option<u64>,
    pub section: Option<String>,
    pub position: Option<u32>,
    pub geo_bucket: Option<String>,
}

impl StoredEvent {
    pub fn from_input(input: EventInput, ts: DateTime<Utc>) -> Self {
        Self {
            user_id: input.user_id,
            item_id: input.item_id,
            kind: input.kind,
            ts,
            dwell_ms: input.dwell_ms,
            section: input.section,
            position: input.position,
            geo_bucket: input.geo_bucket,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicType {
    Category,
    Tag,
}

impl TopicType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Tag => "tag",
        }
    }
}

/// One learned long-term preference row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicAffinity {
    pub topic_type: TopicType,
    pub topic_value: String,
    /// Decaying accumulator of event weights.
    pub raw_score: f64,
    /// Logistic normalization of `raw_score` to 0-100.
    pub score: f64,
    pub interaction_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// Weight map that keeps only its top `capacity` entries by weight. The
/// bound is enforced on every insert, not by a cleanup pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundedWeightMap {
    weights: HashMap<String, f64>,
    capacity: usize,
}

impl BoundedWeightMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            weights: HashMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.weights.get(key).copied()
    }

    pub fn max_weight(&self) -> Option<f64> {
        self.weights
            .values()
            .copied()
            .fold(None, |acc, w| Some(acc.map_or(w, |m: f64| m.max(w))))
    }

    /// Multiply every stored weight by `factor`.
    pub fn decay_all(&mut self, factor: f64) {
        for weight in self.weights.values_mut() {
            *weight *= factor;
        }
    }

    /// Add `delta` to `key`, then drop the lowest-weighted entries until the
    /// map is back within capacity.
    pub fn add(&mut self, key: &str, delta: f64) {
        *self.weights.entry(key.to_string()).or_insert(0.0) += delta;
        if self.weights.len() > self.capacity {
            let mut entries: Vec<(String, f64)> = self.weights.drain().collect();
            entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            entries.truncate(self.capacity);
            self.weights = entries.into_iter().collect();
        }
    }

    pub fn as_map(&self) -> &HashMap<String, f64> {
        &self.weights
    }
}

/// Per-user short-term intent. One active session per user; recreated empty
/// once idle past the timeout or older than the hard cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub tag_weights: BoundedWeightMap,
    pub category_weights: BoundedWeightMap,
    pub started_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionState {
    pub fn is_active(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now - self.last_event_at <= idle_timeout && now < self.expires_at
    }
}

/// Read-only snapshot of session weight maps for scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionWeights {
    pub tag_weights: HashMap<String, f64>,
    pub category_weights: HashMap<String, f64>,
}

impl SessionWeights {
    pub fn is_empty(&self) -> bool {
        self.tag_weights.is_empty() && self.category_weights.is_empty()
    }
}

/// Per-(user, item) exposure row. A missing row reads as all zeros.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImpressionRecord {
    pub impressions_24h: u32,
    pub impressions_7d: u32,
    pub last_shown_at: Option<DateTime<Utc>>,
    pub last_clicked_at: Option<DateTime<Utc>>,
    pub last_traded_at: Option<DateTime<Utc>>,
    pub last_hidden_at: Option<DateTime<Utc>>,
}

/// Which exposure timestamp an interaction updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureKind {
    Click,
    Trade,
    Hide,
}

impl ExposureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Trade => "trade",
            Self::Hide => "hide",
        }
    }
}

/// Rolling activity counters for one (item, geo bucket) scope. Fully
/// recomputed each pass, never incremented in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityRollup {
    pub item_id: String,
    pub geo_bucket: String,
    pub views_5m: u64,
    pub views_1h: u64,
    pub views_24h: u64,
    pub trades_5m: u64,
    pub trades_1h: u64,
    pub trades_24h: u64,
    pub odds_change_1h: f64,
    pub odds_change_24h: f64,
    pub updated_at: DateTime<Utc>,
}

impl VelocityRollup {
    pub fn empty(item_id: impl Into<String>, geo_bucket: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            item_id: item_id.into(),
            geo_bucket: geo_bucket.into(),
            views_5m: 0,
            views_1h: 0,
            views_24h: 0,
            trades_5m: 0,
            trades_1h: 0,
            trades_24h: 0,
            odds_change_1h: 0.0,
            odds_change_24h: 0.0,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbabilitySnapshot {
    pub probability: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Candidate-generation channels, in merge precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Personal,
    TrendingGlobal,
    TrendingLocal,
    FreshNew,
    Exploration,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Personal,
        Channel::TrendingGlobal,
        Channel::TrendingLocal,
        Channel::FreshNew,
        Channel::Exploration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::TrendingGlobal => "trending_global",
            Self::TrendingLocal => "trending_local",
            Self::FreshNew => "fresh_new",
            Self::Exploration => "exploration",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An item pulled into a channel pool, with the channel-local ranking score
/// that put it there.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub item: Arc<Item>,
    pub channel: Channel,
    pub recall_score: f64,
}

/// Component, penalty and bonus values behind a final score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub long_term: f64,
    pub short_term: f64,
    pub trend: f64,
    pub freshness: f64,
    pub base: f64,
    pub cooldown_mult: f64,
    pub frequency_mult: f64,
    pub changed_boost: f64,
    pub owned_boost: f64,
}

impl Default for ScoreBreakdown {
    fn default() -> Self {
        Self {
            long_term: 0.0,
            short_term: 0.0,
            trend: 0.0,
            freshness: 0.0,
            base: 0.0,
            cooldown_mult: 1.0,
            frequency_mult: 1.0,
            changed_boost: 0.0,
            owned_boost: 0.0,
        }
    }
}

/// Scorer output for one (user, item) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: String,
    pub score: f64,
    pub reason_tags: Vec<String>,
    pub breakdown: ScoreBreakdown,
}

/// One slot in a composed feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub item: Arc<Item>,
    pub channel: Channel,
    pub score: f64,
    pub reason_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedMeta {
    pub geo_bucket: String,
    pub quotas_used: HashMap<Channel, usize>,
    pub exploration_rate: f64,
    pub fallback: bool,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedResponse {
    pub items: Vec<FeedItem>,
    pub meta: FeedMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatedItem {
    pub item: Arc<Item>,
    pub shared_tags: usize,
}

/// Aggregated view of what the engine has learned about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfileSummary {
    pub user_id: String,
    pub new_user: bool,
    pub total_interactions: u64,
    pub last_active: Option<DateTime<Utc>>,
    pub top_categories: Vec<TopicAffinity>,
    pub top_tags: Vec<TopicAffinity>,
}
