// User profile summary assembled from the interaction log and the
// decayed affinity view.

use crate::config::RankingConfig;
use crate::models::{TopicType, UserProfileSummary};
use crate::store::{AffinityStore, EventStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

const TOP_TOPIC_LIMIT: usize = 20;

pub struct ProfileService {
    events: Arc<EventStore>,
    affinity: Arc<AffinityStore>,
    config: RankingConfig,
}

impl ProfileService {
    pub fn new(
        events: Arc<EventStore>,
        affinity: Arc<AffinityStore>,
        config: RankingConfig,
    ) -> Self {
        Self {
            events,
            affinity,
            config,
        }
    }

    /// `None` when the user has no recorded events at all.
    pub fn user_profile(&self, user_id: &str, now: DateTime<Utc>) -> Option<UserProfileSummary> {
        let last_active = self.events.user_last_activity(user_id)?;

        let since = now - Duration::days(self.config.scoring.classification_window_days);
        let total_interactions = self.events.user_event_count(user_id, since, true);

        Some(UserProfileSummary {
            user_id: user_id.to_string(),
            new_user: total_interactions < self.config.scoring.new_user_threshold,
            total_interactions,
            last_active: Some(last_active),
            top_categories: self.affinity.top_topics(
                user_id,
                TopicType::Category,
                TOP_TOPIC_LIMIT,
                &self.config.affinity,
                now,
            ),
            top_tags: self.affinity.top_topics(
                user_id,
                TopicType::Tag,
                TOP_TOPIC_LIMIT,
                &self.config.affinity,
                now,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventInput, EventKind, StoredEvent};

    fn stack() -> ProfileService {
        ProfileService::new(
            Arc::new(EventStore::new()),
            Arc::new(AffinityStore::new()),
            RankingConfig::default(),
        )
    }

    fn record(service: &ProfileService, kind: EventKind, ts: DateTime<Utc>) {
        let input = EventInput::new("user-1", "m1", kind);
        service.events.record(StoredEvent::from_input(input, ts));
    }

    #[test]
    fn test_unknown_user_has_no_profile() {
        assert!(stack().user_profile("nobody", Utc::now()).is_none());
    }

    #[test]
    fn test_impressions_do_not_count_as_interactions() {
        let service = stack();
        let now = Utc::now();

        record(&service, EventKind::Click, now - Duration::hours(2));
        record(&service, EventKind::Impression, now - Duration::hours(1));

        let profile = service.user_profile("user-1", now).unwrap();
        assert_eq!(profile.total_interactions, 1);
        assert!(profile.new_user);
        assert_eq!(profile.last_active, Some(now - Duration::hours(1)));
    }

    #[test]
    fn test_known_user_with_top_topics() {
        let service = stack();
        let now = Utc::now();

        for i in 0..12 {
            record(&service, EventKind::Click, now - Duration::hours(i));
        }
        service.affinity.apply_delta(
            "user-1",
            TopicType::Category,
            "sports",
            3.0,
            &service.config.affinity,
            now,
        );
        service.affinity.apply_delta(
            "user-1",
            TopicType::Tag,
            "nba",
            2.0,
            &service.config.affinity,
            now,
        );

        let profile = service.user_profile("user-1", now).unwrap();
        assert!(!profile.new_user);
        assert_eq!(profile.total_interactions, 12);
        assert_eq!(profile.top_categories[0].topic_value, "sports");
        assert_eq!(profile.top_tags[0].topic_value, "nba");
    }
}
