use serde::Serialize;
use std::fmt;

/// Phase of a single reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "detail")]
pub enum RunState {
    NotStarted,
    Connected,
    Queried,
    /// Evaluating the candidate at this index
    Evaluating(usize),
    Committing,
    Done,
    Failed(FailureStage),
}

/// Where a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureStage {
    Connection,
    Query,
    Commit,
}

impl RunState {
    /// Whether the run may move from `self` to `next`.
    ///
    /// Evaluation never fails as a whole; item errors stay inside it.
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (NotStarted, Connected) => true,
            (NotStarted, Failed(FailureStage::Connection)) => true,
            (Connected, Queried) => true,
            (Connected, Failed(FailureStage::Connection)) => true,
            (Connected, Failed(FailureStage::Query)) => true,
            (Queried, Evaluating(0)) => true,
            (Queried, Committing) | (Queried, Done) => true,
            (Queried, Failed(FailureStage::Query)) => true,
            (Evaluating(i), Evaluating(j)) => *j == i + 1,
            (Evaluating(_), Committing) | (Evaluating(_), Done) => true,
            (Committing, Done) => true,
            (Committing, Failed(FailureStage::Commit)) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::NotStarted => f.write_str("not-started"),
            RunState::Connected => f.write_str("connected"),
            RunState::Queried => f.write_str("queried"),
            RunState::Evaluating(i) => write!(f, "evaluating({})", i),
            RunState::Committing => f.write_str("committing"),
            RunState::Done => f.write_str("done"),
            RunState::Failed(stage) => write!(f, "failed({:?})", stage),
        }
    }
}

/// Run-level failure that ended the run early or lost its writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "message")]
pub enum RunFailure {
    Connection(String),
    Query(String),
    Commit(String),
}

impl RunFailure {
    pub fn stage(&self) -> FailureStage {
        match self {
            RunFailure::Connection(_) => FailureStage::Connection,
            RunFailure::Query(_) => FailureStage::Query,
            RunFailure::Commit(_) => FailureStage::Commit,
        }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFailure::Connection(msg) => write!(f, "connection failed: {}", msg),
            RunFailure::Query(msg) => write!(f, "query failed: {}", msg),
            RunFailure::Commit(msg) => write!(f, "commit failed: {}", msg),
        }
    }
}

/// Why a single item could not be processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemErrorKind {
    /// The store rejected the write
    Mutation,
    /// The stored processed timestamp could not be read
    InvalidTimestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub path: String,
    pub kind: ItemErrorKind,
    pub message: String,
}

/// Result of one reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationOutcome {
    pub run_id: String,
    /// Candidates returned by the query
    pub scanned_count: usize,
    /// Items whose processed timestamp was staged this run
    pub processed_count: usize,
    /// Candidates left alone by the debounce policy
    pub skipped_count: usize,
    pub processed_paths: Vec<String>,
    /// Item-level failures, in evaluation order
    pub failures: Vec<ItemFailure>,
    /// True only when a commit was attempted and succeeded
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub state: RunState,
}

impl ReconciliationOutcome {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            scanned_count: 0,
            processed_count: 0,
            skipped_count: 0,
            processed_paths: Vec::new(),
            failures: Vec::new(),
            committed: false,
            failure: None,
            state: RunState::NotStarted,
        }
    }

    /// Whether this run's writes reached durable storage
    pub fn is_durable(&self) -> bool {
        self.committed
    }

    /// True when the run reached `Done`
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn failed_paths(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.path.as_str()).collect()
    }
}
