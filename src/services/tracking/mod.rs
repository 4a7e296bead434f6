// ============================================
// Tracking Service
// ============================================
//
// Single ingest path for engagement events. One recorded event fans out
// to every store that learns from it:
// 1. Append to the event log
// 2. Long-term affinity deltas for the item's category and tags
// 3. Short-term session weight update
// 4. Exposure timestamp for click / participate / hide
//
// Events referencing items the catalog does not know are kept in the
// log for audit but touch no learned state, so affinity and sessions
// never point at unresolvable ids.

use crate::config::{AffinityConfig, SessionConfig};
use crate::models::{EventInput, EventKind, ExposureKind, StoredEvent, TopicType};
use crate::services::impressions::ImpressionLedger;
use crate::services::session::SessionManager;
use crate::store::{AffinityStore, CatalogError, EventStore, ItemCatalog};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, TrackingError>;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// How one ingested event was handled.
#[derive(Debug, Clone)]
pub enum Recorded {
    /// Item resolved: affinity, session and exposure state all updated.
    Applied(Arc<StoredEvent>),
    /// Item unknown to the catalog: event kept for audit only.
    LoggedOnly(Arc<StoredEvent>),
}

impl Recorded {
    pub fn event(&self) -> &Arc<StoredEvent> {
        match self {
            Recorded::Applied(event) | Recorded::LoggedOnly(event) => event,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Recorded::Applied(_))
    }
}

/// Outcome of a batch ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub logged_only: usize,
}

pub struct TrackingService {
    catalog: Arc<dyn ItemCatalog>,
    events: Arc<EventStore>,
    affinity: Arc<AffinityStore>,
    sessions: Arc<SessionManager>,
    impressions: Arc<ImpressionLedger>,
    affinity_config: AffinityConfig,
    session_config: SessionConfig,
}

impl TrackingService {
    pub fn new(
        catalog: Arc<dyn ItemCatalog>,
        events: Arc<EventStore>,
        affinity: Arc<AffinityStore>,
        sessions: Arc<SessionManager>,
        impressions: Arc<ImpressionLedger>,
        affinity_config: AffinityConfig,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            catalog,
            events,
            affinity,
            sessions,
            impressions,
            affinity_config,
            session_config,
        }
    }

    /// Ingest one event at `now`. The event is always appended to the
    /// log; learned state is only touched when the item resolves.
    pub fn record(&self, input: EventInput, now: DateTime<Utc>) -> Result<Recorded> {
        let item = self.catalog.get(&input.item_id)?;
        let weight = input.effective_weight();
        let stored = self.events.record(StoredEvent::from_input(input, now));

        let Some(item) = item else {
            warn!(
                item_id = %stored.item_id,
                user_id = %stored.user_id,
                "event for unknown item kept for audit only"
            );
            return Ok(Recorded::LoggedOnly(stored));
        };

        if weight != 0.0 {
            self.affinity.apply_delta(
                &stored.user_id,
                TopicType::Category,
                &item.category,
                weight * self.affinity_config.category_multiplier,
                &self.affinity_config,
                now,
            );
            for tag in &item.tags {
                self.affinity.apply_delta(
                    &stored.user_id,
                    TopicType::Tag,
                    tag,
                    weight * self.affinity_config.tag_multiplier,
                    &self.affinity_config,
                    now,
                );
            }
        }

        self.sessions.update(
            &stored.user_id,
            &item.category,
            &item.tags,
            weight,
            &self.session_config,
            now,
        );

        match stored.kind {
            EventKind::Click => self.impressions.update_timestamp(
                &stored.user_id,
                &stored.item_id,
                ExposureKind::Click,
                now,
            ),
            EventKind::Participate => self.impressions.update_timestamp(
                &stored.user_id,
                &stored.item_id,
                ExposureKind::Trade,
                now,
            ),
            EventKind::Hide => self.impressions.update_timestamp(
                &stored.user_id,
                &stored.item_id,
                ExposureKind::Hide,
                now,
            ),
            _ => {}
        }

        debug!(
            user_id = %stored.user_id,
            item_id = %stored.item_id,
            kind = %stored.kind,
            weight,
            "event recorded"
        );
        Ok(Recorded::Applied(stored))
    }

    /// Ingest a producer batch through the single-event path. Catalog
    /// failures abort the whole batch.
    pub fn record_batch(&self, inputs: Vec<EventInput>, now: DateTime<Utc>) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for input in inputs {
            if self.record(input, now)?.is_applied() {
                outcome.applied += 1;
            } else {
                outcome.logged_only += 1;
            }
        }
        Ok(outcome)
    }
}
