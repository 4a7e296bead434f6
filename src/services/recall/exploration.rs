use super::{CandidateChannel, ChannelContext};
use crate::models::{Candidate, Channel};
use rand::seq::SliceRandom;

/// Exploration channel: a uniform sample of quality inventory that no
/// other pool claimed, so the feed keeps a discovery tail.
#[derive(Default)]
pub struct ExplorationChannel;

impl ExplorationChannel {
    pub fn new() -> Self {
        Self
    }
}

impl CandidateChannel for ExplorationChannel {
    fn channel(&self) -> Channel {
        Channel::Exploration
    }

    fn generate(&self, ctx: &ChannelContext<'_>) -> Vec<Candidate> {
        let pools = &ctx.config.pools;

        let available: Vec<_> = ctx
            .universe
            .iter()
            .filter(|item| {
                !ctx.claimed.contains(&item.id)
                    && item.volume_total > pools.exploration_min_volume_total
            })
            .collect();

        let mut rng = rand::thread_rng();
        available
            .choose_multiple(&mut rng, pools.exploration)
            .map(|item| Candidate {
                item: (*item).clone(),
                channel: Channel::Exploration,
                recall_score: item.volume_total,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::item;
    use super::*;
    use crate::config::RankingConfig;
    use crate::models::SessionWeights;
    use crate::store::AffinitySnapshot;
    use chrono::Utc;
    use std::collections::HashSet;

    #[test]
    fn test_sample_excludes_claimed_and_low_volume() {
        let universe = vec![
            item("claimed", "sports", &[], 9_000.0),
            item("low-volume", "sports", &[], 500.0),
            item("free-1", "politics", &[], 5_000.0),
            item("free-2", "crypto", &[], 5_000.0),
        ];
        let claimed = HashSet::from(["claimed".to_string()]);

        let config = RankingConfig::default();
        let affinity = AffinitySnapshot::default();
        let session = SessionWeights::default();
        let ctx = ChannelContext {
            user_id: "u1",
            geo_bucket: "US",
            now: Utc::now(),
            universe: &universe,
            claimed: &claimed,
            affinity: &affinity,
            session: &session,
            config: &config,
        };

        let pool = ExplorationChannel::new().generate(&ctx);
        let ids: HashSet<_> = pool.iter().map(|c| c.item.id.clone()).collect();
        assert_eq!(ids, HashSet::from(["free-1".to_string(), "free-2".to_string()]));
    }

    #[test]
    fn test_sample_is_capped_at_pool_size() {
        let universe: Vec<_> = (0..100)
            .map(|i| item(&format!("m{i}"), "sports", &[], 5_000.0))
            .collect();
        let claimed = HashSet::new();

        let config = RankingConfig::default();
        let affinity = AffinitySnapshot::default();
        let session = SessionWeights::default();
        let ctx = ChannelContext {
            user_id: "u1",
            geo_bucket: "US",
            now: Utc::now(),
            universe: &universe,
            claimed: &claimed,
            affinity: &affinity,
            session: &session,
            config: &config,
        };

        let pool = ExplorationChannel::new().generate(&ctx);
        assert_eq!(pool.len(), config.pools.exploration);

        // Sampling without replacement: no id twice.
        let unique: HashSet<_> = pool.iter().map(|c| c.item.id.clone()).collect();
        assert_eq!(unique.len(), pool.len());
    }
}
