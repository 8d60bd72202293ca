//! Reconciliation engine: the debounce policy, the per-run outcome and
//! the orchestration of a single scan.

mod outcome;
mod policy;
mod run;

pub use outcome::{
    FailureStage, ItemErrorKind, ItemFailure, ReconciliationOutcome, RunFailure, RunState,
};
pub use policy::should_process;
pub use run::ReconciliationRun;
