//! One stage on one target
//!
//! A `StageTask` owns everything it needs so it can run on its own tokio
//! task. It appends its terminal result to the execution log itself and
//! reports back what the scheduler needs to decide the target's next step.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use contracts::{
    Command, CommandLogEntry, CommandRecord, ContractError, ErrorKind, ExecutionResult,
    FailurePolicy, SecretProvider, Stage, StageStatus, Target,
};
use tracing::{info, instrument, warn};
use transport::{CommandOutput, Connector, RetryPolicy, Transport, TransportError};

use crate::cancel::CancelToken;
use crate::handle::LogFanout;
use crate::log::ExecutionLog;

/// Why a target stops receiving non-cleanup stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    CommandFailed,
    Transport,
    Cancelled,
}

/// What the scheduler learns from a finished task
pub(crate) struct TaskOutcome<T> {
    pub index: usize,
    pub status: StageStatus,
    /// Connection to keep for later stages
    pub transport: Option<Arc<T>>,
    pub stop: Option<StopReason>,
}

pub(crate) struct StageTask<C: Connector> {
    pub index: usize,
    pub connector: Arc<C>,
    pub secrets: Arc<dyn SecretProvider>,
    pub fanout: Arc<LogFanout>,
    pub log: Arc<ExecutionLog>,
    pub stage: Arc<Stage>,
    pub target: Target,
    pub transport: Option<Arc<C::Transport>>,
    pub variables: Arc<BTreeMap<String, String>>,
    pub connect_retry: RetryPolicy,
    pub command_timeout: Option<Duration>,
    pub cancel: CancelToken,
}

enum CommandOutcome {
    Completed(CommandOutput),
    TimedOut(Duration),
    Lost(TransportError),
    Cancelled,
}

/// Failure that ended the command sequence
struct Failure {
    kind: ErrorKind,
    message: String,
}

/// Output collected across a stage's commands
#[derive(Default)]
struct StageOutput {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    commands: Vec<CommandRecord>,
}

impl StageOutput {
    fn absorb(&mut self, output: &CommandOutput) {
        self.stdout.push_str(&output.stdout);
        self.stderr.push_str(&output.stderr);
    }
}

impl<C: Connector + 'static> StageTask<C> {
    #[instrument(
        name = "stage_task",
        skip(self),
        fields(stage = %self.stage.name, target_name = %self.target.name)
    )]
    pub async fn run(mut self) -> TaskOutcome<C::Transport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut output = StageOutput::default();

        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => match self.connect().await {
                Ok(transport) => Arc::new(transport),
                Err(failure) => {
                    let status = match failure.kind {
                        ErrorKind::Cancellation => StageStatus::Cancelled,
                        _ => StageStatus::Failed,
                    };
                    let stop = match failure.kind {
                        ErrorKind::Cancellation => StopReason::Cancelled,
                        _ => StopReason::Transport,
                    };
                    warn!(error = %failure.message, "target unreachable");
                    self.finish(started_at, clock, status, output, Some(failure));
                    return TaskOutcome {
                        index: self.index,
                        status,
                        transport: None,
                        stop: Some(stop),
                    };
                }
            },
        };

        let stage = Arc::clone(&self.stage);
        let failure = self
            .run_commands(transport.as_ref(), &stage.commands, &stage.name, false, &mut output)
            .await;

        let Some(failure) = failure else {
            info!(duration_ms = clock.elapsed().as_millis() as u64, "stage succeeded");
            self.finish(started_at, clock, StageStatus::Success, output, None);
            return TaskOutcome {
                index: self.index,
                status: StageStatus::Success,
                transport: Some(transport),
                stop: None,
            };
        };

        let (status, stop, failure) = match failure.kind {
            ErrorKind::Cancellation => {
                (StageStatus::Cancelled, Some(StopReason::Cancelled), failure)
            }
            ErrorKind::Transport => (StageStatus::Failed, Some(StopReason::Transport), failure),
            _ => match stage.on_failure {
                FailurePolicy::Continue => {
                    warn!(error = %failure.message, "stage failed, continuing");
                    (StageStatus::Failed, None, failure)
                }
                FailurePolicy::Abort => {
                    warn!(error = %failure.message, "stage failed, aborting target");
                    (StageStatus::Failed, Some(StopReason::CommandFailed), failure)
                }
                FailurePolicy::RollbackToPrevious => {
                    let (status, failure) = self
                        .roll_back(transport.as_ref(), &stage, failure, &mut output)
                        .await;
                    (status, Some(StopReason::CommandFailed), failure)
                }
            },
        };

        // A lost connection is re-established by the next stage that needs it
        let keep = match stop {
            Some(StopReason::Transport) => None,
            _ => Some(transport),
        };

        self.finish(started_at, clock, status, output, Some(failure));
        TaskOutcome {
            index: self.index,
            status,
            transport: keep,
            stop,
        }
    }

    /// Resolve the credential and connect, within the retry bound
    async fn connect(&self) -> Result<C::Transport, Failure> {
        let credential = match &self.target.credential {
            Some(name) => Some(self.secrets.lookup(name).map_err(|e| Failure {
                kind: e.kind(),
                message: e.to_string(),
            })?),
            None => None,
        };

        let connector = self.connector.as_ref();
        let target = &self.target;
        let attempt = self
            .connect_retry
            .run(&target.name, move |_| connector.connect(target, credential.clone()));

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Failure {
                kind: ErrorKind::Cancellation,
                message: ContractError::Cancelled.to_string(),
            }),
            connected = attempt => connected.map_err(|e| {
                let e = ContractError::from(e);
                Failure { kind: e.kind(), message: e.to_string() }
            }),
        }
    }

    /// Run commands in order, stopping at the first failure
    async fn run_commands(
        &self,
        transport: &C::Transport,
        commands: &[Command],
        log_stage: &str,
        rollback: bool,
        output: &mut StageOutput,
    ) -> Option<Failure> {
        for command in commands {
            let command = command.render(&self.variables);
            let description = command.describe();
            let timestamp = Utc::now();
            let clock = Instant::now();

            let outcome = self.execute(transport, &command).await;
            let duration_ms = clock.elapsed().as_millis() as u64;

            let exit_code = match &outcome {
                CommandOutcome::Completed(out) => Some(out.exit_code),
                _ => None,
            };
            output.exit_code = exit_code;
            output.commands.push(CommandRecord {
                command: description.clone(),
                exit_code,
                started_at: timestamp,
                duration_ms,
                rollback,
            });
            observability::record_command(
                &self.target.name,
                log_stage,
                exit_code == Some(0),
                duration_ms,
            );
            self.fanout
                .emit(CommandLogEntry {
                    timestamp,
                    target: self.target.name.clone(),
                    stage: log_stage.to_string(),
                    exit_code,
                    duration_ms,
                    command: description.clone(),
                })
                .await;

            let failure = match outcome {
                CommandOutcome::Completed(out) => {
                    output.absorb(&out);
                    if out.success {
                        continue;
                    }
                    let err = ContractError::command(
                        &self.target.name,
                        log_stage,
                        Some(out.exit_code),
                        format!("'{description}' exited with {}", out.exit_code),
                    );
                    Failure {
                        kind: err.kind(),
                        message: err.to_string(),
                    }
                }
                CommandOutcome::TimedOut(limit) => {
                    let err = ContractError::command(
                        &self.target.name,
                        log_stage,
                        None,
                        format!("'{description}' timed out after {}s", limit.as_secs()),
                    );
                    Failure {
                        kind: err.kind(),
                        message: err.to_string(),
                    }
                }
                CommandOutcome::Lost(e) => {
                    let err = ContractError::from(e);
                    Failure {
                        kind: err.kind(),
                        message: err.to_string(),
                    }
                }
                CommandOutcome::Cancelled => Failure {
                    kind: ErrorKind::Cancellation,
                    message: ContractError::Cancelled.to_string(),
                },
            };
            return Some(failure);
        }
        None
    }

    /// Execute one command under the timeout, racing cancellation
    async fn execute(&self, transport: &C::Transport, command: &Command) -> CommandOutcome {
        let timeout = self
            .stage
            .timeout_secs
            .map(Duration::from_secs)
            .or(self.command_timeout);

        let call = async {
            match command {
                Command::Shell(line) => transport.execute(line).await,
                Command::Transfer { transfer } => {
                    transport.transfer(&transfer.local, &transfer.remote).await
                }
            }
        };

        let bounded = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => Ok(result),
                    Err(_) => Err(limit),
                },
                None => Ok(call.await),
            }
        };

        // Dropping the in-flight call kills its child process
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => CommandOutcome::Cancelled,
            result = bounded => match result {
                Ok(Ok(out)) => CommandOutcome::Completed(out),
                Ok(Err(e)) => CommandOutcome::Lost(e),
                Err(limit) => CommandOutcome::TimedOut(limit),
            },
        }
    }

    /// Run the stage's compensating commands after a command failure
    async fn roll_back(
        &self,
        transport: &C::Transport,
        stage: &Stage,
        failure: Failure,
        output: &mut StageOutput,
    ) -> (StageStatus, Failure) {
        if stage.rollback.is_empty() {
            warn!(error = %failure.message, "stage failed, no rollback declared");
            return (StageStatus::Failed, failure);
        }

        warn!(error = %failure.message, "stage failed, rolling back");
        let log_stage = format!("{}/rollback", stage.name);
        let forward_exit = output.exit_code;
        let rollback = self
            .run_commands(transport, &stage.rollback, &log_stage, true, output)
            .await;
        // The stage reports its failing command; rollback exits stay in `commands`
        output.exit_code = forward_exit;
        match rollback {
            None => {
                info!("rollback completed");
                (StageStatus::RolledBack, failure)
            }
            Some(rollback_failure) => {
                warn!(error = %rollback_failure.message, "rollback failed");
                let kind = match rollback_failure.kind {
                    ErrorKind::Command => failure.kind,
                    other => other,
                };
                (
                    StageStatus::Failed,
                    Failure {
                        kind,
                        message: format!(
                            "{}; rollback failed: {}",
                            failure.message, rollback_failure.message
                        ),
                    },
                )
            }
        }
    }

    fn finish(
        &self,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
        status: StageStatus,
        output: StageOutput,
        failure: Option<Failure>,
    ) {
        let (failure, error) = match failure {
            Some(f) => (Some(f.kind), Some(f.message)),
            None => (None, None),
        };
        self.log.append(ExecutionResult {
            stage: self.stage.name.clone(),
            target: self.target.name.clone(),
            status,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            started_at,
            duration: clock.elapsed(),
            commands: output.commands,
            failure,
            error,
            cleanup: self.stage.cleanup,
        });
    }
}
