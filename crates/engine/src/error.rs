//! Engine error types

use thiserror::Error;

/// Engine-specific errors
///
/// Stage and target failures are not errors: they are recorded in the
/// `ExecutionReport`. These cover the run itself breaking down.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Per-target task panicked or was aborted
    #[error("execution task failed: {0}")]
    TaskFailed(String),
}
