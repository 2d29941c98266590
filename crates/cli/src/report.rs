//! Human-readable output for runs and dry runs.

use contracts::{ExecutionReport, FailurePolicy, Plan, RunStatus, StageStatus};
use engine::ScheduledStage;
use observability::DeployMetricsAggregator;

pub fn policy_label(policy: FailurePolicy) -> &'static str {
    match policy {
        FailurePolicy::Abort => "abort",
        FailurePolicy::Continue => "continue",
        FailurePolicy::RollbackToPrevious => "rollback-to-previous",
    }
}

fn status_mark(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Success => "✓",
        StageStatus::Failed => "✗",
        StageStatus::RolledBack => "↺",
        StageStatus::Skipped => "-",
        StageStatus::Cancelled => "⊘",
    }
}

/// Print the dry-run schedule
pub fn print_schedule(plan: &Plan, stages: &[ScheduledStage]) {
    println!("\n=== Execution Plan: {} ===\n", plan.name);
    for (i, stage) in stages.iter().enumerate() {
        let kind = if stage.cleanup { " [cleanup]" } else { "" };
        println!(
            "{}. {}{} (on failure: {})",
            i + 1,
            stage.name,
            kind,
            policy_label(stage.on_failure)
        );
        if !stage.needs.is_empty() {
            println!("   needs: {}", stage.needs.join(", "));
        }
        if stage.targets.is_empty() {
            println!("   targets: (none selected)");
        } else {
            println!("   targets: {}", stage.targets.join(", "));
        }
        for command in &stage.commands {
            println!("   $ {command}");
        }
        for command in &stage.rollback {
            println!("   ↺ {command}");
        }
    }
    println!();
}

/// Print per-target results and the run summary
pub fn print_report(report: &ExecutionReport) {
    println!("\n=== Deployment Report: {} ===\n", report.plan);

    let mut targets: Vec<&str> = Vec::new();
    for result in &report.results {
        if !targets.contains(&result.target.as_str()) {
            targets.push(&result.target);
        }
    }

    for target in targets {
        println!("{target}");
        for result in report.results_for(target) {
            let cleanup = if result.cleanup { " [cleanup]" } else { "" };
            print!(
                "  {} {}{} ({} ms)",
                status_mark(result.status),
                result.stage,
                cleanup,
                result.duration.as_millis()
            );
            match &result.error {
                Some(error) if result.status != StageStatus::Success => println!(": {error}"),
                _ => println!(),
            }
        }
    }

    let summary = report.summary();
    let status = match report.status {
        RunStatus::Success => "SUCCESS",
        RunStatus::Failed => "FAILED",
        RunStatus::Cancelled => "CANCELLED",
    };
    println!(
        "\n{status}: {} succeeded, {} failed, {} rolled back, {} skipped, {} cancelled in {:.1}s",
        summary.succeeded,
        summary.failed,
        summary.rolled_back,
        summary.skipped,
        summary.cancelled,
        report.duration.as_secs_f64()
    );
    println!(
        "started {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    println!("\n{}", DeployMetricsAggregator::from_results(&report.results).summary());
}
