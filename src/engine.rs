// ============================================
// Feed Engine Facade
// ============================================
//
// Owns the keyed row stores and wires the service layer over them:
// 1. Event ingestion (affinity + session + exposure timestamps)
// 2. Feed composition with impression logging and degraded fallback
// 3. Related-items and profile lookups
// 4. Periodic job set for the embedding service to spawn
//
// Stores are shared `Arc`s and live for the engine's lifetime;
// `apply_config` rebuilds only the service layer on top of them.

use crate::config::RankingConfig;
use crate::jobs::{JobSet, MaintenanceJob, PeriodicJob, RollupJob, SnapshotJob};
use crate::models::{EventInput, FeedResponse, RelatedItem, UserProfileSummary, GLOBAL_GEO};
use crate::services::composer::fallback_feed;
use crate::services::tracking::{BatchOutcome, Recorded, TrackingError};
use crate::services::{
    FeedComposer, ImpressionLedger, ProfileService, RecallLayer, RelatedService, Scorer,
    SessionManager, TrackingService, VelocityService,
};
use crate::store::{AffinityStore, CatalogError, EventStore, ItemCatalog, VelocityStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub struct FeedEngine {
    catalog: Arc<dyn ItemCatalog>,
    events: Arc<EventStore>,
    affinity: Arc<AffinityStore>,
    sessions: Arc<SessionManager>,
    velocity: Arc<VelocityStore>,
    impressions: Arc<ImpressionLedger>,
    tracking: TrackingService,
    composer: FeedComposer,
    related: RelatedService,
    profile: ProfileService,
    velocity_service: Arc<VelocityService>,
    config: RankingConfig,
}

impl FeedEngine {
    pub fn new(catalog: Arc<dyn ItemCatalog>, config: RankingConfig) -> Self {
        let events = Arc::new(EventStore::new());
        let affinity = Arc::new(AffinityStore::new());
        let sessions = Arc::new(SessionManager::new());
        let velocity = Arc::new(VelocityStore::new());
        let impressions = Arc::new(ImpressionLedger::new(Arc::clone(&events)));

        let engine = Self {
            tracking: build_tracking(&catalog, &events, &affinity, &sessions, &impressions, &config),
            composer: build_composer(
                &catalog,
                &events,
                &affinity,
                &sessions,
                &velocity,
                &impressions,
                &config,
            ),
            related: RelatedService::new(Arc::clone(&catalog)),
            profile: ProfileService::new(
                Arc::clone(&events),
                Arc::clone(&affinity),
                config.clone(),
            ),
            velocity_service: Arc::new(VelocityService::new(
                Arc::clone(&catalog),
                Arc::clone(&events),
                Arc::clone(&velocity),
                config.velocity.clone(),
            )),
            catalog,
            events,
            affinity,
            sessions,
            velocity,
            impressions,
            config,
        };
        engine.log_startup();
        engine
    }

    fn log_startup(&self) {
        info!(
            new_user_threshold = self.config.scoring.new_user_threshold,
            pool_total = self.config.pools.total(),
            "feed engine initialized"
        );
    }

    /// Ingest one interaction event. Unknown-item events come back as
    /// `Recorded::LoggedOnly`, not as errors.
    pub fn record_event(&self, input: EventInput, now: DateTime<Utc>) -> Result<Recorded> {
        Ok(self.tracking.record(input, now)?)
    }

    /// Ingest a batch through the same path as single events.
    pub fn record_events(&self, batch: Vec<EventInput>, now: DateTime<Utc>) -> Result<BatchOutcome> {
        Ok(self.tracking.record_batch(batch, now)?)
    }

    /// Compose a personalized feed page. The returned items are logged
    /// as impressions. On pipeline failure the caller gets the degraded
    /// belief-intensity ordering instead of an error, flagged in the
    /// response metadata.
    pub fn compose_feed(
        &self,
        user_id: &str,
        geo_bucket: Option<&str>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> FeedResponse {
        let geo = geo_bucket.unwrap_or(GLOBAL_GEO);

        match self.composer.compose(user_id, geo, limit, now) {
            Ok(response) => {
                let shown: Vec<String> =
                    response.items.iter().map(|i| i.item.id.clone()).collect();
                self.impressions
                    .log_impressions(user_id, &shown, Some(geo), now);
                response
            }
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    error = %err,
                    "feed composition failed, serving fallback"
                );
                let items = self.catalog.open_items().unwrap_or_default();
                fallback_feed(items, geo, limit, now)
            }
        }
    }

    pub fn related_items(&self, item_id: &str, limit: usize) -> Result<Vec<RelatedItem>> {
        Ok(self.related.related_items(item_id, limit)?)
    }

    pub fn user_profile(&self, user_id: &str, now: DateTime<Utc>) -> Option<UserProfileSummary> {
        self.profile.user_profile(user_id, now)
    }

    /// Replace the active configuration. Stores are untouched; the
    /// service layer is rebuilt so subsequent requests see the new
    /// values.
    pub fn apply_config(&mut self, config: RankingConfig) {
        self.tracking = build_tracking(
            &self.catalog,
            &self.events,
            &self.affinity,
            &self.sessions,
            &self.impressions,
            &config,
        );
        self.composer = build_composer(
            &self.catalog,
            &self.events,
            &self.affinity,
            &self.sessions,
            &self.velocity,
            &self.impressions,
            &config,
        );
        self.profile = ProfileService::new(
            Arc::clone(&self.events),
            Arc::clone(&self.affinity),
            config.clone(),
        );
        self.velocity_service = Arc::new(VelocityService::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.events),
            Arc::clone(&self.velocity),
            config.velocity.clone(),
        ));
        self.config = config;
        info!("configuration replaced");
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// The periodic job set, ready for `spawn_all` in the embedding
    /// service or `run_all_once` in tests.
    pub fn jobs(&self) -> JobSet {
        let jobs: Vec<Arc<dyn PeriodicJob>> = vec![
            Arc::new(RollupJob::new(
                Arc::clone(&self.velocity_service),
                self.config.jobs.rollup_interval_secs,
            )),
            Arc::new(SnapshotJob::new(
                Arc::clone(&self.velocity_service),
                self.config.jobs.snapshot_interval_secs,
            )),
            Arc::new(MaintenanceJob::new(
                Arc::clone(&self.events),
                Arc::clone(&self.sessions),
                Arc::clone(&self.impressions),
                Arc::clone(&self.velocity),
                self.config.clone(),
            )),
        ];
        JobSet::new(jobs)
    }
}

fn build_tracking(
    catalog: &Arc<dyn ItemCatalog>,
    events: &Arc<EventStore>,
    affinity: &Arc<AffinityStore>,
    sessions: &Arc<SessionManager>,
    impressions: &Arc<ImpressionLedger>,
    config: &RankingConfig,
) -> TrackingService {
    TrackingService::new(
        Arc::clone(catalog),
        Arc::clone(events),
        Arc::clone(affinity),
        Arc::clone(sessions),
        Arc::clone(impressions),
        config.affinity.clone(),
        config.session.clone(),
    )
}

fn build_composer(
    catalog: &Arc<dyn ItemCatalog>,
    events: &Arc<EventStore>,
    affinity: &Arc<AffinityStore>,
    sessions: &Arc<SessionManager>,
    velocity: &Arc<VelocityStore>,
    impressions: &Arc<ImpressionLedger>,
    config: &RankingConfig,
) -> FeedComposer {
    let scorer = Scorer::new(
        Arc::clone(affinity),
        Arc::clone(sessions),
        Arc::clone(events),
        Arc::clone(velocity),
        Arc::clone(impressions),
        config.clone(),
    );
    FeedComposer::new(
        Arc::clone(catalog),
        Arc::clone(affinity),
        Arc::clone(sessions),
        Arc::clone(impressions),
        RecallLayer::new(Arc::clone(velocity)),
        scorer,
        config.clone(),
    )
}
