// ============================================
// Feed Composer
// ============================================
//
// Turns a feed request into an ordered, diversity-constrained page:
// 1. Build the candidate universe (open items minus recent hides,
//    volume-sorted, truncated to an oversized working set)
// 2. Generate per-channel candidate pools
// 3. Score every pool against one prepared user context
// 4. Trim each channel to its percentage quota of the page
// 5. Merge in channel precedence order, first channel wins an item
// 6. Re-sort by score, oversize, diversity re-rank, truncate
//
// The composer only reads shared state and never writes impression
// rows; exposure logging is the caller's responsibility once the page
// is actually served.

mod fallback;

pub use fallback::fallback_feed;

use crate::config::RankingConfig;
use crate::models::{Channel, FeedItem, FeedMeta, FeedResponse, Item};
use crate::services::diversity::DiversityPass;
use crate::services::impressions::ImpressionLedger;
use crate::services::recall::RecallLayer;
use crate::services::scoring::Scorer;
use crate::services::session::SessionManager;
use crate::store::{AffinityStore, CatalogError, ItemCatalog};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub type Result<T> = std::result::Result<T, ComposerError>;

#[derive(Debug, Error)]
pub enum ComposerError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

pub struct FeedComposer {
    catalog: Arc<dyn ItemCatalog>,
    affinity: Arc<AffinityStore>,
    sessions: Arc<SessionManager>,
    impressions: Arc<ImpressionLedger>,
    recall: RecallLayer,
    scorer: Scorer,
    diversity: DiversityPass,
    config: RankingConfig,
}

impl FeedComposer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn ItemCatalog>,
        affinity: Arc<AffinityStore>,
        sessions: Arc<SessionManager>,
        impressions: Arc<ImpressionLedger>,
        recall: RecallLayer,
        scorer: Scorer,
        config: RankingConfig,
    ) -> Self {
        let diversity = DiversityPass::new(config.diversity.clone());
        Self {
            catalog,
            affinity,
            sessions,
            impressions,
            recall,
            scorer,
            diversity,
            config,
        }
    }

    /// Split the page length across channels by percentage quota.
    /// Rounding remainder (either sign) lands on the personal channel.
    pub fn allocate_quotas(&self, limit: usize) -> HashMap<Channel, usize> {
        let mut allocated: HashMap<Channel, usize> = HashMap::with_capacity(Channel::ALL.len());
        let mut remaining = limit as i64;

        for channel in Channel::ALL {
            let count = (limit as f64 * self.config.quotas.share(channel)).round() as usize;
            allocated.insert(channel, count);
            remaining -= count as i64;
        }

        if remaining != 0 {
            let personal = allocated.entry(Channel::Personal).or_insert(0);
            *personal = (*personal as i64 + remaining).max(0) as usize;
        }

        allocated
    }

    /// Open items minus the user's recently hidden ones, highest total
    /// volume first, truncated to an oversized working set.
    fn candidate_universe(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<Arc<Item>>> {
        let suppression = Duration::seconds(
            (self.config.penalties.hide_suppression_days * 86_400.0) as i64,
        );
        let hidden = self.impressions.hidden_item_ids(user_id, suppression, now);

        let mut universe: Vec<Arc<Item>> = self
            .catalog
            .open_items()?
            .into_iter()
            .filter(|item| !hidden.contains(&item.id))
            .collect();

        universe.sort_by(|a, b| {
            b.volume_total
                .partial_cmp(&a.volume_total)
                .unwrap_or(Ordering::Equal)
        });
        universe.truncate(self.config.pools.total() * self.config.composer.oversize_factor);
        Ok(universe)
    }

    pub fn compose(
        &self,
        user_id: &str,
        geo_bucket: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<FeedResponse> {
        let universe = self.candidate_universe(user_id, now)?;
        let affinity = self.affinity.snapshot(user_id, &self.config.affinity, now);
        let session = self.sessions.get_weights(user_id, &self.config.session, now);

        let mut pools = self.recall.generate_all(
            user_id,
            geo_bucket,
            now,
            &universe,
            &affinity,
            &session,
            &self.config,
        );

        let candidate_ids: Vec<String> = pools
            .values()
            .flat_map(|pool| pool.iter().map(|candidate| candidate.item.id.clone()))
            .collect();
        let ctx = self.scorer.context(user_id, geo_bucket, &candidate_ids, now);

        let quotas = self.allocate_quotas(limit);
        let mut quotas_used: HashMap<Channel, usize> = HashMap::with_capacity(Channel::ALL.len());
        let mut merged: Vec<FeedItem> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for channel in Channel::ALL {
            let quota = quotas.get(&channel).copied().unwrap_or(0);
            let pool = pools.remove(&channel).unwrap_or_default();

            let mut scored: Vec<FeedItem> = pool
                .into_iter()
                .filter_map(|candidate| {
                    let result = self.scorer.score(&candidate.item, &ctx);
                    if result.score < self.config.composer.min_score {
                        return None;
                    }
                    Some(FeedItem {
                        item: candidate.item,
                        channel,
                        score: result.score,
                        reason_tags: result.reason_tags,
                    })
                })
                .collect();

            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
            scored.truncate(quota);
            quotas_used.insert(channel, scored.len());

            for feed_item in scored {
                if seen.insert(feed_item.item.id.clone()) {
                    merged.push(feed_item);
                }
            }
        }

        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        merged.truncate(limit * self.config.composer.oversize_factor);

        let items = self.diversity.rerank(merged, limit);

        let exploration_rate = if limit > 0 {
            quotas.get(&Channel::Exploration).copied().unwrap_or(0) as f64 / limit as f64
        } else {
            0.0
        };

        info!(
            user_id = %user_id,
            geo_bucket = %geo_bucket,
            items = items.len(),
            "feed composed"
        );

        Ok(FeedResponse {
            items,
            meta: FeedMeta {
                geo_bucket: geo_bucket.to_string(),
                quotas_used,
                exploration_rate,
                fallback: false,
                generated_at: now,
            },
        })
    }
}
