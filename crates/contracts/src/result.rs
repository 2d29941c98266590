//! Execution results - Engine output
//!
//! One `ExecutionResult` per (stage, target) pair that reached a terminal state,
//! collected into an `ExecutionReport` for the whole run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ErrorKind;

/// Terminal state of a stage on one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
    /// Failed, compensating commands were run
    RolledBack,
    /// Not run because a stage it needs did not succeed
    Skipped,
    /// Interrupted by cancellation
    Cancelled,
}

impl StageStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::RolledBack | Self::Cancelled)
    }
}

/// One executed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Rendered command description
    pub command: String,
    /// Exit code, `None` when the command never produced one
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Part of the stage's compensating action
    #[serde(default)]
    pub rollback: bool,
}

impl CommandRecord {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Outcome of one stage on one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stage: String,
    pub target: String,
    pub status: StageStatus,
    /// Exit code of the last command run
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandRecord>,
    /// Failure classification when the stage did not succeed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Result of a cleanup stage
    #[serde(default)]
    pub cleanup: bool,
}

impl ExecutionResult {
    /// Result for a stage that was never started on the target
    pub fn skipped(
        stage: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            target: target.into(),
            status: StageStatus::Skipped,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            commands: Vec::new(),
            failure: None,
            error: Some(reason.into()),
            cleanup: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status.is_success()
    }
}

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    Cancelled,
}

/// Aggregate of a complete run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub plan: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Results in the order they were appended to the execution log
    pub results: Vec<ExecutionResult>,
}

/// Result counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rolled_back: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl ExecutionReport {
    /// Build a report, deriving the overall status from the results
    pub fn new(
        plan: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
        results: Vec<ExecutionResult>,
        cancelled: bool,
    ) -> Self {
        let status = if cancelled {
            RunStatus::Cancelled
        } else if results.iter().all(ExecutionResult::succeeded) {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };

        Self {
            plan: plan.into(),
            status,
            started_at,
            duration,
            results,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Results for one target, in execution order
    pub fn results_for<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a ExecutionResult> {
        self.results.iter().filter(move |r| r.target == target)
    }

    pub fn result(&self, stage: &str, target: &str) -> Option<&ExecutionResult> {
        self.results
            .iter()
            .find(|r| r.stage == stage && r.target == target)
    }

    /// Dominant failure class: cancellation, then transport, then command
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        if self.status == RunStatus::Cancelled {
            return Some(ErrorKind::Cancellation);
        }
        if self.is_success() {
            return None;
        }
        let kinds: Vec<ErrorKind> = self.results.iter().filter_map(|r| r.failure).collect();
        if kinds.contains(&ErrorKind::Transport) {
            Some(ErrorKind::Transport)
        } else if kinds.contains(&ErrorKind::Command) {
            Some(ErrorKind::Command)
        } else {
            Some(ErrorKind::Other)
        }
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            total: self.results.len(),
            ..Default::default()
        };
        for result in &self.results {
            match result.status {
                StageStatus::Success => summary.succeeded += 1,
                StageStatus::Failed => summary.failed += 1,
                StageStatus::RolledBack => summary.rolled_back += 1,
                StageStatus::Skipped => summary.skipped += 1,
                StageStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
