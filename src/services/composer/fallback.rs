// Unpersonalized ordering served when the ranked pipeline fails.
// Items are sorted by belief intensity, an activity-weighted
// contestedness that needs no per-user state at all.

use crate::models::{Channel, FeedItem, FeedMeta, FeedResponse, Item};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

fn belief_intensity(item: &Item) -> f64 {
    let volume_score = item.volume_24h / 10_000.0;
    let contestedness = 1.0 - (0.5 - item.probability).abs() * 2.0;
    0.6 * volume_score + 0.4 * contestedness
}

/// Build a degraded feed from whatever open items are available.
pub fn fallback_feed(
    items: Vec<Arc<Item>>,
    geo_bucket: &str,
    limit: usize,
    now: DateTime<Utc>,
) -> FeedResponse {
    let mut open: Vec<Arc<Item>> = items.into_iter().filter(|item| item.is_open()).collect();
    open.sort_by(|a, b| {
        belief_intensity(b)
            .partial_cmp(&belief_intensity(a))
            .unwrap_or(Ordering::Equal)
    });

    let items: Vec<FeedItem> = open
        .into_iter()
        .take(limit)
        .map(|item| {
            let score = belief_intensity(&item);
            FeedItem {
                item,
                channel: Channel::TrendingGlobal,
                score,
                reason_tags: vec!["Fallback".to_string()],
            }
        })
        .collect();

    FeedResponse {
        items,
        meta: FeedMeta {
            geo_bucket: geo_bucket.to_string(),
            quotas_used: HashMap::new(),
            exploration_rate: 0.0,
            fallback: true,
            generated_at: now,
        },
    }
}
