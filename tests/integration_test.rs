use chrono::{Duration, Utc};
use ranking_engine::models::GLOBAL_GEO;
use ranking_engine::store::CatalogError;
use ranking_engine::{
    EventInput, EventKind, FeedEngine, InMemoryCatalog, Item, ItemCatalog, ItemStatus,
    RankingConfig,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer())
            .with(EnvFilter::from_default_env())
            .init();
    });
}

fn market(
    id: &str,
    category: &str,
    tags: &[&str],
    probability: f64,
    volume_24h: f64,
    volume_total: f64,
    age_minutes: i64,
) -> Item {
    Item {
        id: id.to_string(),
        category: category.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        probability,
        volume_24h,
        volume_total,
        created_at: Utc::now() - Duration::minutes(age_minutes),
        resolution_at: None,
        status: ItemStatus::Open,
    }
}

fn engine_with(items: Vec<Item>) -> (FeedEngine, Arc<InMemoryCatalog>) {
    init_tracing();
    let catalog = Arc::new(InMemoryCatalog::with_items(items));
    let shared: Arc<dyn ItemCatalog> = catalog.clone();
    (FeedEngine::new(shared, RankingConfig::default()), catalog)
}

#[test]
fn test_repeated_exposure_fatigues_the_feed() {
    let (engine, _) = engine_with(vec![
        market("m-a", "sports", &["nba"], 0.5, 500.0, 5_000.0, 24 * 60),
        market("m-b", "politics", &["senate"], 0.5, 500.0, 5_000.0, 24 * 60),
    ]);
    let now = Utc::now();

    // Every compose logs impressions, stacking cooldown and frequency
    // penalties onto the next request.
    for pass in 0..4 {
        let page = engine.compose_feed("user-1", None, 10, now);
        assert!(
            page.items.iter().any(|i| i.item.id == "m-a"),
            "m-a missing on pass {pass}"
        );
    }

    let page = engine.compose_feed("user-1", None, 10, now);
    assert!(page.items.is_empty());
}

#[test]
fn test_session_signal_expires_after_idle_timeout() {
    let (engine, _) = engine_with(vec![
        market("nba-1", "sports", &["nba"], 0.5, 500.0, 5_000.0, 24 * 60),
        market("pol-1", "politics", &["senate"], 0.5, 500.0, 5_000.0, 24 * 60),
    ]);
    let t0 = Utc::now();

    engine
        .record_event(EventInput::new("user-1", "nba-1", EventKind::Click), t0)
        .unwrap();

    let warm = engine.compose_feed("user-1", None, 10, t0 + Duration::minutes(10));
    let nba = warm.items.iter().find(|i| i.item.id == "nba-1").unwrap();
    assert!(nba.reason_tags.contains(&"ST:Match".to_string()));

    // Idle timeout is 60 minutes; at 75 the session weights are gone.
    let cold = engine.compose_feed("user-1", None, 10, t0 + Duration::minutes(75));
    let nba = cold.items.iter().find(|i| i.item.id == "nba-1").unwrap();
    assert!(!nba.reason_tags.contains(&"ST:Match".to_string()));
}

#[test]
fn test_affinity_decays_between_profile_reads() {
    let (engine, _) = engine_with(vec![market(
        "nba-1",
        "sports",
        &["nba"],
        0.5,
        500.0,
        5_000.0,
        24 * 60,
    )]);
    let t0 = Utc::now();

    engine
        .record_event(EventInput::new("user-1", "nba-1", EventKind::Participate), t0)
        .unwrap();

    let early = engine.user_profile("user-1", t0 + Duration::days(1)).unwrap();
    let late = engine.user_profile("user-1", t0 + Duration::days(10)).unwrap();

    let raw_early = early.top_categories[0].raw_score;
    let raw_late = late.top_categories[0].raw_score;
    assert!(raw_late < raw_early);
    assert!(raw_late > 0.0);
}

#[test]
fn test_compose_feed_limit_and_uniqueness() {
    let categories = ["sports", "politics", "crypto", "science"];
    let items = (0..60)
        .map(|i| {
            market(
                &format!("m{i}"),
                categories[i % 4],
                &[],
                0.5,
                400.0,
                60_000.0 - i as f64 * 100.0,
                24 * 60 + i as i64,
            )
        })
        .collect();
    let (engine, _) = engine_with(items);

    let page = engine.compose_feed("user-1", None, 30, Utc::now());

    assert!(page.items.len() <= 30);
    let unique: std::collections::HashSet<&str> =
        page.items.iter().map(|i| i.item.id.as_str()).collect();
    assert_eq!(unique.len(), page.items.len());
    assert!(!page.meta.fallback);
    assert_eq!(page.meta.geo_bucket, GLOBAL_GEO);
}

#[test]
fn test_composed_feed_interleaves_categories() {
    let categories = ["sports", "politics", "crypto", "science"];
    let items = (0..12)
        .map(|i| {
            market(
                &format!("m{i}"),
                categories[i % 4],
                &[],
                0.5,
                400.0,
                12_000.0 - i as f64 * 100.0,
                24 * 60 + i as i64,
            )
        })
        .collect();
    let (engine, _) = engine_with(items);

    let page = engine.compose_feed("user-1", None, 20, Utc::now());
    assert!(!page.items.is_empty());

    let mut run = 1;
    for pair in page.items.windows(2) {
        if pair[0].item.category == pair[1].item.category {
            run += 1;
        } else {
            run = 1;
        }
        assert!(run <= 2, "category run exceeded 2");
    }
}

struct FlakyCatalog {
    inner: InMemoryCatalog,
    failures: AtomicU32,
}

impl ItemCatalog for FlakyCatalog {
    fn get(&self, item_id: &str) -> Result<Option<Arc<Item>>, CatalogError> {
        self.inner.get(item_id)
    }

    fn open_items(&self) -> Result<Vec<Arc<Item>>, CatalogError> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(CatalogError::Unavailable("catalog offline".to_string()));
        }
        self.inner.open_items()
    }
}

#[test]
fn test_pipeline_failure_degrades_to_fallback() {
    init_tracing();
    let inner = InMemoryCatalog::with_items(vec![
        market("contested", "sports", &[], 0.50, 2_000.0, 20_000.0, 24 * 60),
        market("lopsided", "sports", &[], 0.95, 2_000.0, 20_000.0, 24 * 60),
    ]);
    let catalog = Arc::new(FlakyCatalog {
        inner,
        failures: AtomicU32::new(1),
    });
    let shared: Arc<dyn ItemCatalog> = catalog.clone();
    let engine = FeedEngine::new(shared, RankingConfig::default());

    // First compose hits the failure and serves the degraded ordering.
    let degraded = engine.compose_feed("user-1", Some("US-CA"), 10, Utc::now());
    assert!(degraded.meta.fallback);
    assert_eq!(degraded.meta.geo_bucket, "US-CA");
    assert_eq!(degraded.items[0].item.id, "contested");
    assert!(degraded.items[0].reason_tags.contains(&"Fallback".to_string()));

    // The catalog recovered, so the next page is personalized again.
    let ranked = engine.compose_feed("user-1", Some("US-CA"), 10, Utc::now());
    assert!(!ranked.meta.fallback);
}

#[test]
fn test_batch_ingestion_separates_applied_from_logged_only() {
    let (engine, _) = engine_with(vec![
        market("nba-1", "sports", &["nba"], 0.5, 500.0, 5_000.0, 24 * 60),
        market("pol-1", "politics", &["senate"], 0.5, 500.0, 5_000.0, 24 * 60),
    ]);
    let now = Utc::now();

    let outcome = engine
        .record_events(
            vec![
                EventInput::new("user-1", "nba-1", EventKind::Click),
                EventInput::new("user-1", "ghost", EventKind::Click),
                EventInput::new("user-1", "pol-1", EventKind::View),
            ],
            now,
        )
        .unwrap();

    assert_eq!(outcome.applied, 2);
    assert_eq!(outcome.logged_only, 1);

    // The ghost event stays in the log, so it still counts as activity,
    // but only the two resolvable items taught the profile anything.
    let profile = engine.user_profile("user-1", now).unwrap();
    assert_eq!(profile.total_interactions, 3);
    assert_eq!(profile.top_categories.len(), 2);
}

#[tokio::test]
async fn test_odds_move_marks_items_changed() {
    let (engine, catalog) = engine_with(vec![market(
        "m-odds",
        "sports",
        &["nba"],
        0.40,
        500.0,
        5_000.0,
        24 * 60,
    )]);
    let t0 = Utc::now();

    // Baseline snapshot well before the one-hour odds window.
    engine.jobs().run_all_once(t0 - Duration::minutes(90)).await;

    catalog.upsert(market(
        "m-odds",
        "sports",
        &["nba"],
        0.44,
        500.0,
        5_000.0,
        24 * 60,
    ));
    engine.jobs().run_all_once(t0).await;

    let page = engine.compose_feed("user-1", None, 10, t0);
    let item = page.items.iter().find(|i| i.item.id == "m-odds").unwrap();
    assert!(item.reason_tags.contains(&"Changed".to_string()));
}

#[test]
fn test_apply_config_reclassifies_users() {
    let (mut engine, _) = engine_with(vec![
        market("nba-1", "sports", &["nba"], 0.5, 500.0, 5_000.0, 24 * 60),
        market("pol-1", "politics", &["senate"], 0.5, 500.0, 5_000.0, 24 * 60),
    ]);
    let t0 = Utc::now();

    for _ in 0..12 {
        engine
            .record_event(
                EventInput::new("user-1", "nba-1", EventKind::Click),
                t0 - Duration::days(1),
            )
            .unwrap();
    }

    let known = engine.compose_feed("user-1", None, 10, t0);
    let nba = known.items.iter().find(|i| i.item.id == "nba-1").unwrap();
    assert!(!nba.reason_tags.contains(&"NewUser".to_string()));

    let mut config = RankingConfig::default();
    config.scoring.new_user_threshold = 50;
    engine.apply_config(config);
    assert_eq!(engine.config().scoring.new_user_threshold, 50);

    let reclassified = engine.compose_feed("user-1", None, 10, t0);
    let nba = reclassified
        .items
        .iter()
        .find(|i| i.item.id == "nba-1")
        .unwrap();
    assert!(nba.reason_tags.contains(&"NewUser".to_string()));
}
