// ============================================
// Background Jobs Module
// ============================================
//
// Periodic maintenance passes behind the ranking path:
// 1. Rollup recompute (activity counters + odds deltas)
// 2. Probability snapshots for the odds-change baselines
// 3. Store maintenance (event/session/impression/history expiry)
//
// Every pass takes its timestamp explicitly, so a pass can be replayed
// deterministically in tests. Passes are rerun-safe; a failed run only
// degrades freshness until the next interval.

use crate::config::RankingConfig;
use crate::services::{ImpressionLedger, SessionManager, VelocityService};
use crate::store::{EventStore, VelocityStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &'static str;
    fn interval(&self) -> Duration;
    async fn run_once(&self, now: DateTime<Utc>) -> Result<()>;
}

/// Recomputes velocity rollups and odds deltas for active scopes.
pub struct RollupJob {
    velocity: Arc<VelocityService>,
    interval: Duration,
}

impl RollupJob {
    pub fn new(velocity: Arc<VelocityService>, interval_secs: u64) -> Self {
        Self {
            velocity,
            interval: Duration::from_secs(interval_secs),
        }
    }
}

#[async_trait]
impl PeriodicJob for RollupJob {
    fn name(&self) -> &'static str {
        "velocity-rollup"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, now: DateTime<Utc>) -> Result<()> {
        let rollups = self.velocity.compute_all_rollups(now);
        let odds = self.velocity.compute_odds_changes(now)?;
        info!(
            active_items = rollups.active_items,
            scopes = rollups.scopes,
            rows_written = rollups.rows_written,
            items_moved = odds.items_moved,
            "rollup pass completed"
        );
        Ok(())
    }
}

/// Records probability snapshots used as odds-change baselines.
pub struct SnapshotJob {
    velocity: Arc<VelocityService>,
    interval: Duration,
}

impl SnapshotJob {
    pub fn new(velocity: Arc<VelocityService>, interval_secs: u64) -> Self {
        Self {
            velocity,
            interval: Duration::from_secs(interval_secs),
        }
    }
}

#[async_trait]
impl PeriodicJob for SnapshotJob {
    fn name(&self) -> &'static str {
        "probability-snapshot"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, now: DateTime<Utc>) -> Result<()> {
        let recorded = self.velocity.record_snapshots(now)?;
        info!(snapshots = recorded, "snapshot pass completed");
        Ok(())
    }
}

/// Expires sessions, rolls impression counters, prunes old events and
/// probability history.
pub struct MaintenanceJob {
    events: Arc<EventStore>,
    sessions: Arc<SessionManager>,
    impressions: Arc<ImpressionLedger>,
    velocity: Arc<VelocityStore>,
    config: RankingConfig,
    interval: Duration,
}

impl MaintenanceJob {
    pub fn new(
        events: Arc<EventStore>,
        sessions: Arc<SessionManager>,
        impressions: Arc<ImpressionLedger>,
        velocity: Arc<VelocityStore>,
        config: RankingConfig,
    ) -> Self {
        let interval = Duration::from_secs(config.jobs.maintenance_interval_secs);
        Self {
            events,
            sessions,
            impressions,
            velocity,
            config,
            interval,
        }
    }
}

#[async_trait]
impl PeriodicJob for MaintenanceJob {
    fn name(&self) -> &'static str {
        "store-maintenance"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, now: DateTime<Utc>) -> Result<()> {
        let events_pruned = self.events.prune(
            now - chrono::Duration::days(self.config.maintenance.event_retention_days),
        );
        let sessions_purged = self.sessions.purge_expired(&self.config.session, now);
        let counters_rolled = self.impressions.roll_counters(now);
        let history_pruned = self.velocity.prune_history(
            now - chrono::Duration::days(self.config.velocity.snapshot_retention_days),
        );
        info!(
            events_pruned,
            sessions_purged,
            counters_rolled,
            history_pruned,
            "maintenance pass completed"
        );
        Ok(())
    }
}

/// The full periodic job set, ready to spawn or to drive manually.
pub struct JobSet {
    jobs: Vec<Arc<dyn PeriodicJob>>,
}

impl JobSet {
    pub fn new(jobs: Vec<Arc<dyn PeriodicJob>>) -> Self {
        Self { jobs }
    }

    /// Spawn one looping task per job. Handles are returned so the
    /// embedding service can abort them on shutdown.
    pub fn spawn_all(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.jobs
            .iter()
            .map(|job| {
                let job = Arc::clone(job);
                tokio::spawn(async move {
                    loop {
                        if let Err(err) = job.run_once(Utc::now()).await {
                            error!(job = job.name(), error = %err, "job pass failed");
                        }
                        sleep(job.interval()).await;
                    }
                })
            })
            .collect()
    }

    /// Drive one pass of every job at the given timestamp. Failures are
    /// logged, not propagated.
    pub async fn run_all_once(&self, now: DateTime<Utc>) {
        let passes = self.jobs.iter().map(|job| {
            let job = Arc::clone(job);
            async move {
                if let Err(err) = job.run_once(now).await {
                    error!(job = job.name(), error = %err, "job pass failed");
                }
            }
        });
        join_all(passes).await;
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
