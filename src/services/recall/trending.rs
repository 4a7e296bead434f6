use super::{take_with_category_cap, CandidateChannel, ChannelContext};
use crate::models::{Candidate, Channel, GLOBAL_GEO};
use crate::store::VelocityStore;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrendingScope {
    Global,
    Local,
}

/// Trending channel: rank by 1h rollup velocity in one scope. Items
/// without a rollup row rank at zero rather than being excluded.
pub struct TrendingChannel {
    scope: TrendingScope,
    velocity: Arc<VelocityStore>,
}

impl TrendingChannel {
    pub fn global(velocity: Arc<VelocityStore>) -> Self {
        Self {
            scope: TrendingScope::Global,
            velocity,
        }
    }

    pub fn local(velocity: Arc<VelocityStore>) -> Self {
        Self {
            scope: TrendingScope::Local,
            velocity,
        }
    }
}

impl CandidateChannel for TrendingChannel {
    fn channel(&self) -> Channel {
        match self.scope {
            TrendingScope::Global => Channel::TrendingGlobal,
            TrendingScope::Local => Channel::TrendingLocal,
        }
    }

    fn generate(&self, ctx: &ChannelContext<'_>) -> Vec<Candidate> {
        let geo = match self.scope {
            TrendingScope::Global => GLOBAL_GEO,
            TrendingScope::Local => ctx.geo_bucket,
        };
        let weights = &ctx.config.scoring;

        let scored = ctx
            .universe
            .iter()
            .map(|item| {
                let velocity = self
                    .velocity
                    .rollup(&item.id, geo)
                    .map(|row| {
                        weights.trend_trades_weight * row.trades_1h as f64
                            + weights.trend_views_weight * row.views_1h as f64
                    })
                    .unwrap_or(0.0);
                (velocity, item.clone())
            })
            .collect();

        let limit = ctx.config.pools.for_channel(self.channel());
        take_with_category_cap(
            scored,
            limit,
            ctx.config.pools.category_cap_share,
            self.channel(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::item;
    use super::*;
    use crate::config::RankingConfig;
    use crate::models::{SessionWeights, VelocityRollup};
    use crate::store::AffinitySnapshot;
    use chrono::Utc;
    use std::collections::HashSet;

    #[test]
    fn test_local_scope_ranks_by_local_rollups() {
        let now = Utc::now();
        let velocity = Arc::new(VelocityStore::new());

        let mut hot_in_us = VelocityRollup::empty("us-hot", "US", now);
        hot_in_us.trades_1h = 40;
        hot_in_us.views_1h = 100;
        velocity.replace_scope("US", vec![hot_in_us]);

        let mut hot_globally = VelocityRollup::empty("world-hot", GLOBAL_GEO, now);
        hot_globally.trades_1h = 500;
        velocity.replace_scope(GLOBAL_GEO, vec![hot_globally]);

        let universe = vec![
            item("world-hot", "sports", &[], 1000.0),
            item("us-hot", "politics", &[], 1000.0),
            item("cold", "crypto", &[], 1000.0),
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

        let local = TrendingChannel::local(Arc::clone(&velocity)).generate(&ctx);
        assert_eq!(local[0].item.id, "us-hot");
        assert!((local[0].recall_score - (0.7 * 40.0 + 0.3 * 100.0)).abs() < 1e-9);

        let global = TrendingChannel::global(velocity).generate(&ctx);
        assert_eq!(global[0].item.id, "world-hot");
    }
}
