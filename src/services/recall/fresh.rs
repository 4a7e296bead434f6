use super::{CandidateChannel, ChannelContext};
use crate::models::{Candidate, Channel};
use crate::utils::exponential_decay;
use std::cmp::Ordering;

/// Fresh channel: the newest items that already show a pulse. The
/// volume floor keeps zero-interest listings from burning feed slots.
#[derive(Default)]
pub struct FreshChannel;

impl FreshChannel {
    pub fn new() -> Self {
        Self
    }
}

impl CandidateChannel for FreshChannel {
    fn channel(&self) -> Channel {
        Channel::FreshNew
    }

    fn generate(&self, ctx: &ChannelContext<'_>) -> Vec<Candidate> {
        let pools = &ctx.config.pools;

        let mut fresh: Vec<_> = ctx
            .universe
            .iter()
            .filter(|item| {
                item.age_hours(ctx.now) < pools.fresh_max_age_hours
                    && item.volume_24h > pools.fresh_min_volume_24h
            })
            .collect();

        // Newest first, id as the deterministic tie-break.
        fresh.sort_by(|a, b| match b.created_at.cmp(&a.created_at) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        });

        fresh
            .into_iter()
            .take(pools.fresh_new)
            .map(|item| Candidate {
                item: item.clone(),
                channel: Channel::FreshNew,
                recall_score: exponential_decay(
                    item.age_hours(ctx.now),
                    ctx.config.scoring.freshness_decay_hours,
                ),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RankingConfig;
    use crate::models::{Item, ItemStatus, SessionWeights};
    use crate::store::AffinitySnapshot;
    use chrono::{DateTime, Duration, Utc};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn aged_item(id: &str, created_at: DateTime<Utc>, volume_24h: f64) -> Arc<Item> {
        Arc::new(Item {
            id: id.to_string(),
            category: "sports".to_string(),
            tags: vec![],
            probability: 0.5,
            volume_24h,
            volume_total: 2_000.0,
            created_at,
            resolution_at: None,
            status: ItemStatus::Open,
        })
    }

    #[test]
    fn test_filters_by_age_and_volume_then_sorts_newest() {
        let now = Utc::now();
        let universe = vec![
            aged_item("too-old", now - Duration::hours(100), 500.0),
            aged_item("too-quiet", now - Duration::hours(5), 50.0),
            aged_item("older", now - Duration::hours(48), 500.0),
            aged_item("newest", now - Duration::hours(2), 500.0),
        ];

        let config = RankingConfig::default();
        let claimed = HashSet::new();
        let affinity = AffinitySnapshot::default();
        let session = SessionWeights::default();
        let ctx = ChannelContext {
            user_id: "u1",
            geo_bucket: "US",
            now,
            universe: &universe,
            claimed: &claimed,
            affinity: &affinity,
            session: &session,
            config: &config,
        };

        let pool = FreshChannel::new().generate(&ctx);
        let ids: Vec<_> = pool.iter().map(|c| c.item.id.clone()).collect();
        assert_eq!(ids, vec!["newest", "older"]);
    }

    #[test]
    fn test_equal_timestamps_break_ties_by_id() {
        let now = Utc::now();
        let born = now - Duration::hours(3);
        let universe = vec![
            aged_item("b-item", born, 500.0),
            aged_item("a-item", born, 500.0),
        ];

        let config = RankingConfig::default();
        let claimed = HashSet::new();
        let affinity = AffinitySnapshot::default();
        let session = SessionWeights::default();
        let ctx = ChannelContext {
            user_id: "u1",
            geo_bucket: "US",
            now,
            universe: &universe,
            claimed: &claimed,
            affinity: &affinity,
            session: &session,
            config: &config,
        };

        let pool = FreshChannel::new().generate(&ctx);
        let ids: Vec<_> = pool.iter().map(|c| c.item.id.clone()).collect();
        assert_eq!(ids, vec!["a-item", "b-item"]);
    }
}
