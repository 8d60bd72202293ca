//! Periodic trigger for reconciliation runs.
//!
//! The scheduler ticks on a fixed interval and awaits each run before the
//! next tick is considered, so one scheduler never overlaps its own runs.
//! Missed ticks are skipped rather than replayed.

use crate::reconcile::{ReconciliationOutcome, ReconciliationRun};
use crate::utils::ContentPath;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Schedule and run parameters
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub search_root: ContentPath,
    pub debounce_window: Duration,
}

/// Counters accumulated across every run of one scheduler
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    pub ticks: AtomicU64,
    pub skipped_disabled: AtomicU64,
    pub runs: AtomicU64,
    pub failed_runs: AtomicU64,
    pub commits: AtomicU64,
    pub items_processed: AtomicU64,
    pub item_failures: AtomicU64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, outcome: &ReconciliationOutcome) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if outcome.failure.is_some() {
            self.failed_runs.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.committed {
            self.commits.fetch_add(1, Ordering::Relaxed);
            self.items_processed
                .fetch_add(outcome.processed_count as u64, Ordering::Relaxed);
        }
        self.item_failures
            .fetch_add(outcome.failures.len() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped_disabled: self.skipped_disabled.load(Ordering::Relaxed),
            runs: self.runs.load(Ordering::Relaxed),
            failed_runs: self.failed_runs.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            items_processed: self.items_processed.load(Ordering::Relaxed),
            item_failures: self.item_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub ticks: u64,
    pub skipped_disabled: u64,
    pub runs: u64,
    pub failed_runs: u64,
    pub commits: u64,
    /// Items whose stamp was durably committed
    pub items_processed: u64,
    pub item_failures: u64,
}

/// Run a single pass now, honoring the enabled gate.
///
/// Returns `None` when the schedule is disabled.
pub async fn trigger_once(
    run: &ReconciliationRun,
    config: &ScheduleConfig,
) -> Option<ReconciliationOutcome> {
    if !config.enabled {
        debug!("Reconciliation is disabled");
        return None;
    }
    Some(
        run.execute(&config.search_root, config.debounce_window, Utc::now())
            .await,
    )
}

/// Tick until `shutdown_rx` turns true, running one pass per tick.
pub async fn run_scheduler(
    run: Arc<ReconciliationRun>,
    config: ScheduleConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SchedulerMetrics> {
    let metrics = Arc::new(SchedulerMetrics::new());

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_secs = config.interval.as_secs(),
        debounce_secs = config.debounce_window.as_secs(),
        root = %config.search_root,
        enabled = config.enabled,
        "Reconciliation scheduler started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Reconciliation scheduler shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                metrics.ticks.fetch_add(1, Ordering::Relaxed);
                match trigger_once(&run, &config).await {
                    Some(outcome) => metrics.record(&outcome),
                    None => {
                        metrics.skipped_disabled.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    info!(
        ticks = snapshot.ticks,
        runs = snapshot.runs,
        failed_runs = snapshot.failed_runs,
        items_processed = snapshot.items_processed,
        item_failures = snapshot.item_failures,
        "Reconciliation scheduler stopped"
    );

    metrics
}
