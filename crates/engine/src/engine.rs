//! Engine - stage scheduling across targets

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use contracts::{
    ExecutionReport, ExecutionResult, Plan, SecretProvider, Stage, StageStatus, Target,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use transport::{Connector, EnvSecretProvider};

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::executor::{StageTask, StopReason, TaskOutcome};
use crate::handle::{LogFanout, DEFAULT_SINK_CAPACITY};
use crate::log::ExecutionLog;

/// Builder for creating an Engine
pub struct EngineBuilder<C: Connector> {
    connector: C,
    secrets: Arc<dyn SecretProvider>,
    config: EngineConfig,
    fanout: LogFanout,
}

impl<C: Connector + 'static> EngineBuilder<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            secrets: Arc::new(EnvSecretProvider::new()),
            config: EngineConfig::default(),
            fanout: LogFanout::new(),
        }
    }

    pub fn secrets(mut self, secrets: Arc<dyn SecretProvider>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a deploy log sink
    ///
    /// Spawns the sink worker, so this must be called inside a runtime.
    pub fn log_sink<S: contracts::LogSink + Send + 'static>(mut self, sink: S) -> Self {
        self.fanout.add(sink, DEFAULT_SINK_CAPACITY);
        self
    }

    pub fn build(self) -> Engine<C> {
        Engine {
            connector: Arc::new(self.connector),
            secrets: self.secrets,
            config: self.config,
            fanout: Arc::new(self.fanout),
        }
    }
}

/// Per-target scheduling state, owned by the run loop
struct TargetState<T> {
    target: Target,
    transport: Option<Arc<T>>,
    stopped: Option<StopReason>,
    outcomes: HashMap<String, StageStatus>,
}

impl<T> TargetState<T> {
    fn new(target: Target) -> Self {
        Self {
            target,
            transport: None,
            stopped: None,
            outcomes: HashMap::new(),
        }
    }

    /// First need of `stage` that did not succeed on this target
    ///
    /// A need whose stage never applied to this target counts as met.
    fn unmet_need<'a>(&self, stage: &'a Stage) -> Option<&'a str> {
        stage
            .needs
            .iter()
            .find(|need| {
                self.outcomes
                    .get(need.as_str())
                    .is_some_and(|status| !status.is_success())
            })
            .map(String::as_str)
    }
}

/// Deployment engine
pub struct Engine<C: Connector> {
    connector: Arc<C>,
    secrets: Arc<dyn SecretProvider>,
    config: EngineConfig,
    fanout: Arc<LogFanout>,
}

impl<C: Connector + 'static> Engine<C> {
    pub fn builder(connector: C) -> EngineBuilder<C> {
        EngineBuilder::new(connector)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run `plan` against `targets`
    ///
    /// Stages run one after another; a stage only starts once every target
    /// of the previous stage reached a terminal state. Stage and target
    /// failures are recorded in the report, not returned as errors.
    #[instrument(
        name = "engine_run",
        skip_all,
        fields(plan = %plan.name, stages = plan.stages.len(), targets = targets.len())
    )]
    pub async fn run(
        &self,
        plan: &Plan,
        targets: &[Target],
        cancel: CancelToken,
    ) -> Result<ExecutionReport, EngineError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let log = Arc::new(ExecutionLog::new());
        let variables = Arc::new(self.config.resolve_variables(plan));
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut states: Vec<TargetState<C::Transport>> = Vec::with_capacity(targets.len());
        for target in targets {
            if states.iter().any(|s| s.target.name == target.name) {
                warn!(target_name = %target.name, "target listed twice, running it once");
                continue;
            }
            states.push(TargetState::new(target.clone()));
        }

        info!(parallelism = self.config.parallelism, "run started");

        for stage in &plan.stages {
            if cancel.is_cancelled() {
                break;
            }

            let stage = Arc::new(stage.clone());
            let mut tasks = JoinSet::new();
            let mut dispatched = 0usize;
            let mut interrupted = false;

            for index in 0..states.len() {
                {
                    let state = &mut states[index];
                    if !stage.targets.matches(&state.target) {
                        continue;
                    }

                    match state.stopped {
                        Some(StopReason::Cancelled) => continue,
                        Some(_) if !stage.cleanup => continue,
                        _ => {}
                    }

                    if !stage.cleanup {
                        if let Some(need) = state.unmet_need(&stage) {
                            debug!(
                                stage = %stage.name,
                                target_name = %state.target.name,
                                need,
                                "needs not met"
                            );
                            state.outcomes.insert(stage.name.clone(), StageStatus::Skipped);
                            log.append(ExecutionResult::skipped(
                                &stage.name,
                                &state.target.name,
                                format!("needed stage '{need}' did not succeed"),
                            ));
                            continue;
                        }
                    }
                }

                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!(stage = %stage.name, "cancelled while dispatching");
                        interrupted = true;
                        break;
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => permit
                        .map_err(|e| EngineError::TaskFailed(e.to_string()))?,
                };

                let state = &mut states[index];
                let task = StageTask {
                    index,
                    connector: Arc::clone(&self.connector),
                    secrets: Arc::clone(&self.secrets),
                    fanout: Arc::clone(&self.fanout),
                    log: Arc::clone(&log),
                    stage: Arc::clone(&stage),
                    target: state.target.clone(),
                    transport: state.transport.take(),
                    variables: Arc::clone(&variables),
                    connect_retry: self.config.connect_retry,
                    command_timeout: self.config.command_timeout,
                    cancel: cancel.clone(),
                };

                tasks.spawn(async move {
                    let outcome = task.run().await;
                    drop(permit);
                    outcome
                });
                dispatched += 1;
            }

            info!(
                stage = %stage.name,
                cleanup = stage.cleanup,
                targets = dispatched,
                "stage dispatched"
            );
            drain(&mut tasks, &mut states, &stage.name).await?;
            if interrupted {
                break;
            }
        }

        let cancelled = cancel.is_cancelled();
        drop(states);
        let results = Arc::try_unwrap(log)
            .map(ExecutionLog::into_results)
            .unwrap_or_else(|shared| shared.snapshot());

        let report = ExecutionReport::new(
            plan.name.clone(),
            started_at,
            clock.elapsed(),
            results,
            cancelled,
        );
        observability::record_run(report.status, report.duration);

        let summary = report.summary();
        info!(
            status = ?report.status,
            results = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed + summary.rolled_back,
            skipped = summary.skipped,
            duration_ms = report.duration.as_millis() as u64,
            "run finished"
        );

        Ok(report)
    }

    /// Flush and close every log sink
    pub async fn shutdown(self) {
        match Arc::try_unwrap(self.fanout) {
            Ok(fanout) => {
                for (sink, totals) in fanout.shutdown().await {
                    if totals.failure_count > 0 {
                        warn!(
                            sink = %sink,
                            writes = totals.write_count,
                            failures = totals.failure_count,
                            "log sink lost entries"
                        );
                    } else {
                        debug!(sink = %sink, writes = totals.write_count, "log sink closed");
                    }
                }
            }
            Err(_) => warn!("log sinks still in use, skipping shutdown"),
        }
    }
}

/// Wait for every in-flight task and fold its outcome into the target state
async fn drain<T: Send + Sync + 'static>(
    tasks: &mut JoinSet<TaskOutcome<T>>,
    states: &mut [TargetState<T>],
    stage: &str,
) -> Result<(), EngineError> {
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|e| EngineError::TaskFailed(e.to_string()))?;
        let state = &mut states[outcome.index];
        state.transport = outcome.transport;
        state.outcomes.insert(stage.to_string(), outcome.status);
        if let Some(stop) = outcome.stop {
            // Cancellation overrides any earlier reason
            if state.stopped.is_none() || stop == StopReason::Cancelled {
                state.stopped = Some(stop);
            }
        }
    }
    Ok(())
}
