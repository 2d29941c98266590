//! `run` command implementation.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use contracts::{ErrorKind, ExecutionReport, Plan, Target};
use engine::{cancellation, Engine, EngineConfig, FileSink, TracingSink};
use plan_loader::PlanLoader;
use tracing::{info, warn};
use transport::{fetch_declared, EnvSecretProvider, ShellConnector, SshPrograms};

use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::report;

/// Execute the `run` command
pub async fn run_deploy(args: &RunArgs) -> Result<()> {
    info!(plan = %args.plan.display(), "Loading plan");

    let plan = PlanLoader::load_from_path(&args.plan)?;
    let targets = select_targets(&plan, &args.targets)?;
    let config = build_config(&plan, args);

    info!(
        plan = %plan.name,
        stages = plan.stages.len(),
        targets = targets.len(),
        parallelism = config.parallelism,
        "Plan loaded"
    );

    // Dry run - print the schedule and exit
    if args.dry_run {
        let variables = config.resolve_variables(&plan);
        report::print_schedule(&plan, &engine::schedule(&plan, &targets, &variables));
        return Ok(());
    }

    let plan_dir = args
        .plan
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let source_dir = fetch_declared(
        plan.source.as_ref(),
        plan_dir,
        &args.workdir,
        args.reference.as_deref(),
    )
    .await
    .map_err(CliError::Source)?;
    info!(source = %source_dir.display(), "Source ready");

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let secrets: Arc<dyn contracts::SecretProvider> = match &args.secret_prefix {
        Some(prefix) => Arc::new(EnvSecretProvider::with_prefix(prefix.clone())),
        None => Arc::new(EnvSecretProvider::new()),
    };

    let connector = ShellConnector::new(source_dir, config.connect_retry).with_ssh_programs(
        SshPrograms {
            ssh: args.ssh_program.clone(),
            scp: args.scp_program.clone(),
        },
    );
    let mut builder = Engine::builder(connector)
        .secrets(secrets)
        .config(config)
        .log_sink(TracingSink::new("tracing"));
    if let Some(path) = &args.log_file {
        let sink = FileSink::open("file", path)
            .await
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder = builder.log_sink(sink);
    }
    let engine = builder.build();

    let (cancel, token) = cancellation();
    let watcher = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, cancelling run...");
        cancel.cancel();
    });

    info!("Starting deployment...");
    let outcome = engine.run(&plan, &targets, token).await;
    watcher.abort();
    engine.shutdown().await;

    let report = outcome.context("Deployment engine failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .context("Failed to serialize execution report")?;
        println!("{json}");
    } else {
        report::print_report(&report);
    }

    info!(
        status = ?report.status,
        duration_ms = report.duration.as_millis() as u64,
        "deploy finished"
    );
    outcome_error(&report).map_or(Ok(()), Err)
}

fn select_targets(plan: &Plan, names: &[String]) -> Result<Vec<Target>> {
    plan.select_targets(names).map_err(|name| {
        let declared: Vec<String> = plan.targets.iter().map(|t| t.name.clone()).collect();
        CliError::unknown_target(name, &declared)
    })
}

/// Plan settings with command line overrides applied
fn build_config(plan: &Plan, args: &RunArgs) -> EngineConfig {
    let mut config = EngineConfig::from_settings(&plan.settings)
        .with_variable("NO_CACHE", if args.no_cache { "--no-cache" } else { "" });
    if let Some(parallelism) = args.parallelism {
        config = config.with_parallelism(parallelism);
    }
    for (name, value) in &args.variables {
        config = config.with_variable(name.clone(), value.clone());
    }
    config
}

/// Error matching the report's dominant failure, if any
fn outcome_error(report: &ExecutionReport) -> Option<CliError> {
    match report.failure_kind()? {
        ErrorKind::Cancellation => Some(CliError::Cancelled),
        ErrorKind::Transport => {
            let mut unreachable: Vec<&str> = report
                .results
                .iter()
                .filter(|r| r.failure == Some(ErrorKind::Transport))
                .map(|r| r.target.as_str())
                .collect();
            unreachable.sort_unstable();
            unreachable.dedup();
            Some(CliError::Transport {
                unreachable: unreachable.len(),
            })
        }
        _ => {
            let summary = report.summary();
            Some(CliError::Execution {
                failed: summary.failed + summary.rolled_back,
                total: summary.total,
            })
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use contracts::{ExecutionResult, StageStatus};

    fn failed(stage: &str, target: &str, kind: ErrorKind) -> ExecutionResult {
        let mut result = ExecutionResult::skipped(stage, target, "failed");
        result.status = StageStatus::Failed;
        result.failure = Some(kind);
        result
    }

    fn report(results: Vec<ExecutionResult>, cancelled: bool) -> ExecutionReport {
        ExecutionReport::new("test", Utc::now(), Duration::from_secs(1), results, cancelled)
    }

    #[test]
    fn transport_failure_wins_over_command_failure() {
        let report = report(
            vec![
                failed("build", "web-1", ErrorKind::Command),
                failed("build", "web-2", ErrorKind::Transport),
                failed("deploy", "web-2", ErrorKind::Transport),
            ],
            false,
        );
        let err = outcome_error(&report).unwrap();
        assert!(matches!(err, CliError::Transport { unreachable: 1 }));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn command_failure_maps_to_execution() {
        let report = report(vec![failed("build", "web-1", ErrorKind::Command)], false);
        assert_eq!(outcome_error(&report).unwrap().exit_code(), 3);
    }

    #[test]
    fn cancelled_run_maps_to_130() {
        let report = report(Vec::new(), true);
        assert_eq!(outcome_error(&report).unwrap().exit_code(), 130);
    }

    #[test]
    fn success_has_no_error() {
        assert!(outcome_error(&report(Vec::new(), false)).is_none());
    }

    #[test]
    fn repeated_target_is_selected_once() {
        let plan = Plan::new("p", vec![Target::local("web-1")], Vec::new());
        let names = vec!["web-1".to_string(), "web-1".to_string()];
        assert_eq!(select_targets(&plan, &names).unwrap().len(), 1);
    }

    #[test]
    fn unknown_target_is_rejected() {
        let plan = Plan::new("p", vec![Target::local("web-1")], Vec::new());
        let err = select_targets(&plan, &["db".to_string()]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
