// ============================================
// Candidate Recall
// ============================================
//
// Five channels pull oversized candidate pools from the open-item
// universe, each ranking by its own signal:
// - personal: long-term + session similarity
// - trending_global / trending_local: 1h velocity per scope
// - fresh_new: newest items clearing a minimum activity bar
// - exploration: random sample of quality inventory nothing else took
//
// Channels run in merge-precedence order so exploration can exclude
// everything the earlier pools already claimed.

mod exploration;
mod fresh;
mod personal;
mod trending;

use crate::config::RankingConfig;
use crate::models::{Candidate, Channel, Item, SessionWeights};
use crate::store::{AffinitySnapshot, VelocityStore};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

pub use exploration::ExplorationChannel;
pub use fresh::FreshChannel;
pub use personal::PersonalChannel;
pub use trending::TrendingChannel;

/// Request-scoped inputs shared by every channel.
pub struct ChannelContext<'a> {
    pub user_id: &'a str,
    pub geo_bucket: &'a str,
    pub now: DateTime<Utc>,
    /// Open items minus exclusions, volume-sorted and truncated upstream.
    pub universe: &'a [Arc<Item>],
    /// Item ids already taken by earlier channels.
    pub claimed: &'a HashSet<String>,
    pub affinity: &'a AffinitySnapshot,
    pub session: &'a SessionWeights,
    pub config: &'a RankingConfig,
}

/// One candidate-generation strategy.
pub trait CandidateChannel: Send + Sync {
    fn channel(&self) -> Channel;
    fn generate(&self, ctx: &ChannelContext<'_>) -> Vec<Candidate>;
}

/// Runs every channel in precedence order and returns the pools.
pub struct RecallLayer {
    channels: Vec<Box<dyn CandidateChannel>>,
}

impl RecallLayer {
    pub fn new(velocity: Arc<VelocityStore>) -> Self {
        let channels: Vec<Box<dyn CandidateChannel>> = vec![
            Box::new(PersonalChannel::new()),
            Box::new(TrendingChannel::global(Arc::clone(&velocity))),
            Box::new(TrendingChannel::local(velocity)),
            Box::new(FreshChannel::new()),
            Box::new(ExplorationChannel::new()),
        ];
        Self { channels }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn generate_all(
        &self,
        user_id: &str,
        geo_bucket: &str,
        now: DateTime<Utc>,
        universe: &[Arc<Item>],
        affinity: &AffinitySnapshot,
        session: &SessionWeights,
        config: &RankingConfig,
    ) -> HashMap<Channel, Vec<Candidate>> {
        let mut claimed: HashSet<String> = HashSet::new();
        let mut pools = HashMap::with_capacity(self.channels.len());

        for strategy in &self.channels {
            let ctx = ChannelContext {
                user_id,
                geo_bucket,
                now,
                universe,
                claimed: &claimed,
                affinity,
                session,
                config,
            };
            let candidates = strategy.generate(&ctx);
            debug!(
                channel = %strategy.channel(),
                count = candidates.len(),
                "channel pool generated"
            );
            claimed.extend(candidates.iter().map(|c| c.item.id.clone()));
            pools.insert(strategy.channel(), candidates);
        }

        info!(
            user_id = %user_id,
            geo_bucket = %geo_bucket,
            unique_candidates = claimed.len(),
            "candidate pools generated"
        );
        pools
    }
}

/// Take the top `limit` of a score-sorted list, letting no single
/// category exceed its share of the pool.
pub(crate) fn take_with_category_cap(
    mut scored: Vec<(f64, Arc<Item>)>,
    limit: usize,
    cap_share: f64,
    channel: Channel,
) -> Vec<Candidate> {
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let max_per_category = (limit as f64 * cap_share) as usize;
    let mut category_counts: HashMap<String, usize> = HashMap::new();
    let mut result = Vec::with_capacity(limit.min(scored.len()));

    for (score, item) in scored {
        let count = category_counts.entry(item.category.clone()).or_insert(0);
        if *count >= max_per_category {
            continue;
        }
        *count += 1;
        result.push(Candidate {
            item,
            channel,
            recall_score: score,
        });
        if result.len() >= limit {
            break;
        }
    }

    result
}


#[cfg(test)]
mod tests {
    use super::test_support::item;
    use super::*;

    #[test]
    fn test_category_cap_bounds_single_category() {
        let scored: Vec<(f64, Arc<Item>)> = (0..20)
            .map(|i| {
                let category = if i < 15 { "sports" } else { "politics" };
                (20.0 - i as f64, item(&format!("m{i}"), category, &[], 1000.0))
            })
            .collect();

        // limit 20, 15% share -> at most 3 per category.
        let taken = take_with_category_cap(scored, 20, 0.15, Channel::Personal);
        let sports = taken.iter().filter(|c| c.item.category == "sports").count();
        assert_eq!(sports, 3);
        assert_eq!(taken.len(), 6);
    }

    #[test]
    fn test_generate_all_runs_channels_in_precedence_order() {
        let velocity = Arc::new(VelocityStore::new());
        let layer = RecallLayer::new(velocity);

        let universe: Vec<Arc<Item>> = (0..40)
            .map(|i| item(&format!("m{i}"), &format!("cat{}", i % 8), &[], 5_000.0))
            .collect();

        let config = RankingConfig::default();
        let pools = layer.generate_all(
            "u1",
            "US",
            Utc::now(),
            &universe,
            &AffinitySnapshot::default(),
            &SessionWeights::default(),
            &config,
        );

        assert_eq!(pools.len(), 5);
        for channel in Channel::ALL {
            assert!(pools.contains_key(&channel));
        }

        // Everything was claimed before exploration ran, so its pool is
        // empty for this tiny universe.
        assert!(pools[&Channel::Exploration].is_empty());
    }
}
