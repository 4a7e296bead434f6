// ============================================
// Session Manager
// ============================================
//
// Short-term intent per user: one active session holding bounded tag and
// category weight maps. A session goes stale after an idle gap or at a
// hard lifetime cap fixed when the session starts; the next event then
// opens a fresh session instead of reviving the old one.
//
// Every update decays the existing weights before adding the new event,
// so the maps lean toward what the user is doing right now.

use crate::config::SessionConfig;
use crate::models::{BoundedWeightMap, SessionState, SessionWeights};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<String, SessionState>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the user's active session, opening a new
    /// session first if none is active. Returns the session id the event
    /// landed in.
    pub fn update(
        &self,
        user_id: &str,
        category: &str,
        tags: &[String],
        weight: f64,
        config: &SessionConfig,
        now: DateTime<Utc>,
    ) -> Uuid {
        let idle_timeout = Duration::minutes(config.idle_timeout_minutes);
        let mut entry = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| new_session(config, now));

        if !entry.is_active(now, idle_timeout) {
            debug!(
                user_id = %user_id,
                stale_session_id = %entry.session_id,
                "session expired, starting fresh"
            );
            *entry.value_mut() = new_session(config, now);
        }

        let session = entry.value_mut();
        session.category_weights.decay_all(config.decay_multiplier);
        session.tag_weights.decay_all(config.decay_multiplier);

        session.category_weights.add(category, weight);
        let tag_weight = weight * config.tag_event_multiplier;
        for tag in tags {
            session.tag_weights.add(tag, tag_weight);
        }

        session.last_event_at = now;
        session.session_id
    }

    /// Weight maps of the user's active session. Missing or stale
    /// sessions read as empty; reads never create or revive state.
    pub fn get_weights(&self, user_id: &str, config: &SessionConfig, now: DateTime<Utc>) -> SessionWeights {
        let idle_timeout = Duration::minutes(config.idle_timeout_minutes);
        match self.sessions.get(user_id) {
            Some(session) if session.is_active(now, idle_timeout) => SessionWeights {
                tag_weights: session.tag_weights.as_map().clone(),
                category_weights: session.category_weights.as_map().clone(),
            },
            _ => SessionWeights::default(),
        }
    }

    /// Drop sessions no user can extend anymore. Returns how many were
    /// removed.
    pub fn purge_expired(&self, config: &SessionConfig, now: DateTime<Utc>) -> u64 {
        let idle_timeout = Duration::minutes(config.idle_timeout_minutes);
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.is_active(now, idle_timeout));
        (before - self.sessions.len()) as u64
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn new_session(config: &SessionConfig, now: DateTime<Utc>) -> SessionState {
    SessionState {
        session_id: Uuid::new_v4(),
        tag_weights: BoundedWeightMap::new(config.max_tags),
        category_weights: BoundedWeightMap::new(config.max_categories),
        started_at: now,
        last_event_at: now,
        expires_at: now + Duration::hours(config.max_lifetime_hours),
    }
}
