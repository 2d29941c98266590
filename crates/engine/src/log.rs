//! Execution log
//!
//! Append-only record of `ExecutionResult`s, shared by concurrent target
//! tasks. Order is the order in which results reached a terminal state.

use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::ExecutionResult;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ExecutionLog {
    results: Mutex<Vec<ExecutionResult>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ExecutionResult>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a terminal result
    pub fn append(&self, result: ExecutionResult) {
        debug!(
            stage = %result.stage,
            target_name = %result.target,
            status = ?result.status,
            "result recorded"
        );
        observability::record_stage_result(&result);
        self.lock().push(result);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the results so far
    pub fn snapshot(&self) -> Vec<ExecutionResult> {
        self.lock().clone()
    }

    pub fn into_results(self) -> Vec<ExecutionResult> {
        self.results
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
