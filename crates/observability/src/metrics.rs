//! Deploy metrics
//!
//! `record_*` functions publish to the global `metrics` recorder (a no-op
//! unless an exporter is installed). `DeployMetricsAggregator` keeps the same
//! numbers in memory for the end-of-run summary.

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{ExecutionResult, RunStatus, StageStatus};
use metrics::{counter, gauge, histogram};

fn status_label(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Success => "success",
        StageStatus::Failed => "failed",
        StageStatus::RolledBack => "rolled_back",
        StageStatus::Skipped => "skipped",
        StageStatus::Cancelled => "cancelled",
    }
}

/// Record one executed command
pub fn record_command(target: &str, stage: &str, success: bool, duration_ms: u64) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "deploy_commands_total",
        "target" => target.to_string(),
        "stage" => stage.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        "deploy_command_duration_ms",
        "stage" => stage.to_string()
    )
    .record(duration_ms as f64);
}

/// Record the terminal state of a stage on a target
pub fn record_stage_result(result: &ExecutionResult) {
    counter!(
        "deploy_stage_results_total",
        "stage" => result.stage.clone(),
        "status" => status_label(result.status)
    )
    .increment(1);

    if result.status != StageStatus::Skipped {
        histogram!(
            "deploy_stage_duration_ms",
            "stage" => result.stage.clone()
        )
        .record(result.duration.as_millis() as f64);
    }
}

/// Record a completed run
pub fn record_run(status: RunStatus, duration: Duration) {
    let status = match status {
        RunStatus::Success => "success",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    };
    counter!("deploy_runs_total", "status" => status).increment(1);
    gauge!("deploy_last_run_duration_seconds").set(duration.as_secs_f64());
}

/// Record a deploy log sink write
pub fn record_sink_write(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "deploy_log_writes_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// In-memory aggregation of execution results
#[derive(Debug, Clone, Default)]
pub struct DeployMetricsAggregator {
    pub total_results: u64,
    pub total_commands: u64,
    pub failed_commands: u64,

    /// Result count per status
    pub status_counts: BTreeMap<StageStatus, u64>,

    /// Command duration (ms)
    pub command_stats: RunningStats,

    /// Stage duration (ms) per stage
    pub stage_stats: BTreeMap<String, RunningStats>,

    /// Failed results per target
    pub target_failures: BTreeMap<String, u64>,
}

impl DeployMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one result
    pub fn update(&mut self, result: &ExecutionResult) {
        self.total_results += 1;
        *self.status_counts.entry(result.status).or_insert(0) += 1;

        for command in &result.commands {
            self.total_commands += 1;
            if !command.succeeded() {
                self.failed_commands += 1;
            }
            self.command_stats.push(command.duration_ms as f64);
        }

        if result.status != StageStatus::Skipped {
            self.stage_stats
                .entry(result.stage.clone())
                .or_default()
                .push(result.duration.as_millis() as f64);
        }

        if result.status.is_failure() {
            *self.target_failures.entry(result.target.clone()).or_insert(0) += 1;
        }
    }

    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ExecutionResult>) -> Self {
        let mut aggregator = Self::new();
        for result in results {
            aggregator.update(result);
        }
        aggregator
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_results: self.total_results,
            total_commands: self.total_commands,
            failed_commands: self.failed_commands,
            status_counts: self
                .status_counts
                .iter()
                .map(|(status, count)| (status_label(*status), *count))
                .collect(),
            command_duration_ms: StatsSummary::from(&self.command_stats),
            stage_duration_ms: self
                .stage_stats
                .iter()
                .map(|(stage, stats)| (stage.clone(), StatsSummary::from(stats)))
                .collect(),
            target_failures: self.target_failures.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Summary report
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_results: u64,
    pub total_commands: u64,
    pub failed_commands: u64,
    pub status_counts: BTreeMap<&'static str, u64>,
    pub command_duration_ms: StatsSummary,
    pub stage_duration_ms: BTreeMap<String, StatsSummary>,
    pub target_failures: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Deploy Metrics Summary ===")?;
        writeln!(f, "Stage results: {}", self.total_results)?;
        for (status, count) in &self.status_counts {
            writeln!(f, "  {status}: {count}")?;
        }
        writeln!(
            f,
            "Commands: {} ({} failed)",
            self.total_commands, self.failed_commands
        )?;
        writeln!(f, "Command duration (ms): {}", self.command_duration_ms)?;

        if !self.stage_duration_ms.is_empty() {
            writeln!(f, "Stage duration (ms):")?;
            for (stage, stats) in &self.stage_duration_ms {
                writeln!(f, "  {stage}: {stats}")?;
            }
        }

        if !self.target_failures.is_empty() {
            writeln!(f, "Failures per target:")?;
            for (target, count) in &self.target_failures {
                writeln!(f, "  {target}: {count}")?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.0}, max={:.0}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
