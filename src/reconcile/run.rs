use super::outcome::{
    FailureStage, ItemErrorKind, ItemFailure, ReconciliationOutcome, RunFailure, RunState,
};
use super::policy::should_process;
use crate::store::{ContentQuery, ContentStore, PropertyValue, ServiceIdentity, StoreSession};
use crate::utils::{property, ContentPath};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Executes reconciliation passes against one content store.
///
/// Each call to [`execute`](Self::execute) opens its own session, so a
/// `ReconciliationRun` can be shared, but it does not serialize calls:
/// overlapping runs may both stamp the same item.
pub struct ReconciliationRun {
    store: Arc<dyn ContentStore>,
    identity: ServiceIdentity,
}

impl ReconciliationRun {
    pub fn new(store: Arc<dyn ContentStore>, identity: ServiceIdentity) -> Self {
        Self { store, identity }
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// Run one scan-evaluate-commit pass.
    ///
    /// Never fails: store errors end up in the returned outcome. The store
    /// session is released exactly once on every path that acquired it.
    pub async fn execute(
        &self,
        search_root: &ContentPath,
        window: Duration,
        now: DateTime<Utc>,
    ) -> ReconciliationOutcome {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("reconciliation_run", run_id = %run_id, root = %search_root);

        async move {
            let mut tracker = Tracker::new(ReconciliationOutcome::new(run_id));

            info!(window_secs = window.as_secs(), "Starting reconciliation run");

            let mut session = match self.store.connect(&self.identity).await {
                Ok(session) => session,
                Err(e) => {
                    error!(error = %e, "Failed to connect to content store");
                    return tracker.fail(RunFailure::Connection(e.to_string()));
                }
            };
            tracker.advance(RunState::Connected);

            let outcome = evaluate(session.as_mut(), tracker, search_root, window, now).await;
            session.release().await;

            log_outcome(&outcome);
            outcome
        }
        .instrument(span)
        .await
    }
}

/// Everything after the connection is established. Returns without
/// releasing; the caller owns the session.
async fn evaluate(
    session: &mut dyn StoreSession,
    mut tracker: Tracker,
    search_root: &ContentPath,
    window: Duration,
    now: DateTime<Utc>,
) -> ReconciliationOutcome {
    if let Err(e) = session.begin().await {
        error!(error = %e, "Failed to obtain store session");
        return tracker.fail(RunFailure::Connection(e.to_string()));
    }

    let query = ContentQuery::descendants_of(search_root.clone())
        .with_property(property::LAST_REPLICATED);
    debug!(query = %query, "Querying published items");

    let candidates = match session.query(&query).await {
        Ok(items) => items,
        Err(e) => {
            error!(error = %e, "Candidate query failed");
            return tracker.fail(RunFailure::Query(e.to_string()));
        }
    };
    tracker.advance(RunState::Queried);
    tracker.outcome.scanned_count = candidates.len();

    let stamp = PropertyValue::Date(now);

    for (index, item) in candidates.iter().enumerate() {
        tracker.advance(RunState::Evaluating(index));

        let processed_at = match item.processed_at() {
            Ok(ts) => ts,
            Err(e) => {
                warn!(path = %item.path, error = %e, "Unreadable processed timestamp");
                tracker.record_failure(&item.path, ItemErrorKind::InvalidTimestamp, e.to_string());
                continue;
            }
        };

        if !should_process(processed_at, now, window) {
            debug!(path = %item.path, "Processed recently, skipping");
            tracker.outcome.skipped_count += 1;
            continue;
        }

        match session
            .set_property(&item.path, property::PROCESSED_AT, stamp.clone())
            .await
        {
            Ok(()) => {
                debug!(path = %item.path, "Staged processed timestamp");
                tracker.outcome.processed_count += 1;
                tracker.outcome.processed_paths.push(item.path.clone());
            }
            Err(e) => {
                warn!(path = %item.path, error = %e, "Failed to stage processed timestamp");
                tracker.record_failure(&item.path, ItemErrorKind::Mutation, e.to_string());
            }
        }
    }

    if tracker.outcome.processed_count == 0 {
        debug!("No items needed processing");
        return tracker.finish();
    }

    tracker.advance(RunState::Committing);
    match session.commit().await {
        Ok(()) => {
            tracker.outcome.committed = true;
            tracker.finish()
        }
        Err(e) => {
            error!(
                error = %e,
                staged = tracker.outcome.processed_count,
                "Commit failed, staged writes were not applied"
            );
            tracker.fail(RunFailure::Commit(e.to_string()))
        }
    }
}

fn log_outcome(outcome: &ReconciliationOutcome) {
    match &outcome.failure {
        None => info!(
            scanned = outcome.scanned_count,
            processed = outcome.processed_count,
            skipped = outcome.skipped_count,
            failed = outcome.failures.len(),
            committed = outcome.committed,
            "Reconciliation run finished"
        ),
        Some(failure) => warn!(
            scanned = outcome.scanned_count,
            processed = outcome.processed_count,
            failed = outcome.failures.len(),
            failure = %failure,
            "Reconciliation run aborted"
        ),
    }
}

/// Owns the outcome under construction and walks the run state machine
struct Tracker {
    outcome: ReconciliationOutcome,
}

impl Tracker {
    fn new(outcome: ReconciliationOutcome) -> Self {
        Self { outcome }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.outcome.state.can_transition_to(&next),
            "invalid run transition {} -> {}",
            self.outcome.state,
            next
        );
        self.outcome.state = next;
    }

    fn record_failure(&mut self, path: &str, kind: ItemErrorKind, message: String) {
        self.outcome.failures.push(ItemFailure {
            path: path.to_string(),
            kind,
            message,
        });
    }

    fn finish(mut self) -> ReconciliationOutcome {
        self.advance(RunState::Done);
        self.outcome
    }

    /// Abort with `failure`. Anything before the commit leaves the counts
    /// at zero so callers never mistake an aborted scan for a partial one.
    fn fail(mut self, failure: RunFailure) -> ReconciliationOutcome {
        let stage = failure.stage();
        self.advance(RunState::Failed(stage));
        if stage != FailureStage::Commit {
            self.outcome.scanned_count = 0;
            self.outcome.processed_count = 0;
        }
        self.outcome.committed = false;
        self.outcome.failure = Some(failure);
        self.outcome
    }
}
