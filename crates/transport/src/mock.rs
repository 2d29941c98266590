//! Mock transport
//!
//! In-memory transport for tests and demos. Supports injecting connection
//! failures, failing commands and per-command latency, and records every
//! command it is asked to run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use contracts::{CredentialHandle, Target};
use tracing::instrument;

use crate::client::{CommandOutput, Connector, Transport};
use crate::error::{Result, TransportError};

/// Matches every target in `MockConfig` rules
pub const ANY_TARGET: &str = "*";

/// Mock behaviour configuration
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Targets whose connection attempts always fail
    pub fail_connect: Vec<String>,
    /// Targets whose first N connection attempts fail
    pub flaky_connect: HashMap<String, u32>,
    /// (target, command substring) pairs that exit with `exit_code`
    pub fail_commands: Vec<(String, String)>,
    /// (target, command substring) pairs that lose the connection
    pub drop_connection: Vec<(String, String)>,
    /// Exit code of failing commands
    pub exit_code: i32,
    /// Simulated duration of every command
    pub delay: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            fail_connect: Vec::new(),
            flaky_connect: HashMap::new(),
            fail_commands: Vec::new(),
            drop_connection: Vec::new(),
            exit_code: 1,
            delay: Duration::ZERO,
        }
    }
}

impl MockConfig {
    pub fn fail_connect(mut self, target: impl Into<String>) -> Self {
        self.fail_connect.push(target.into());
        self
    }

    pub fn flaky_connect(mut self, target: impl Into<String>, failures: u32) -> Self {
        self.flaky_connect.insert(target.into(), failures);
        self
    }

    /// Commands on `target` containing `pattern` exit non-zero
    pub fn fail_command(mut self, target: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.fail_commands.push((target.into(), pattern.into()));
        self
    }

    /// Commands on `target` containing `pattern` fail with a connection error
    pub fn drop_connection(
        mut self,
        target: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        self.drop_connection.push((target.into(), pattern.into()));
        self
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn matches(rules: &[(String, String)], target: &str, command: &str) -> bool {
        rules
            .iter()
            .any(|(t, pattern)| {
                (t == target || t == ANY_TARGET) && command.contains(pattern.as_str())
            })
    }
}

/// Command seen by a mock transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub target: String,
    pub command: String,
}

#[derive(Debug, Default)]
struct MockState {
    executed: Mutex<Vec<ExecutedCommand>>,
    connect_attempts: Mutex<HashMap<String, u32>>,
}

/// Connector producing `MockTransport`s that share one recording
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    config: Arc<MockConfig>,
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(MockState::default()),
        }
    }

    /// Every command run so far, in start order
    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.state.executed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Commands run on one target, in start order
    pub fn commands_for(&self, target: &str) -> Vec<String> {
        self.state
            .executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.target == target)
            .map(|c| c.command.clone())
            .collect()
    }

    pub fn connect_attempts(&self, target: &str) -> u32 {
        self.state
            .connect_attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .copied()
            .unwrap_or(0)
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    #[instrument(
        name = "mock_connect",
        skip(self, target, _credential),
        fields(target_name = %target.name)
    )]
    async fn connect(
        &self,
        target: &Target,
        _credential: Option<CredentialHandle>,
    ) -> Result<MockTransport> {
        let attempt = {
            let mut attempts = self
                .state
                .connect_attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let count = attempts.entry(target.name.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if self.config.fail_connect.contains(&target.name) {
            return Err(TransportError::connection(&target.name, "mock connection refused"));
        }
        if let Some(&failures) = self.config.flaky_connect.get(&target.name) {
            if attempt <= failures {
                return Err(TransportError::connection(&target.name, "mock connection timed out"));
            }
        }

        Ok(MockTransport {
            name: target.name.clone(),
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
        })
    }
}

/// Mock transport for one target
#[derive(Debug, Clone)]
pub struct MockTransport {
    name: String,
    config: Arc<MockConfig>,
    state: Arc<MockState>,
}

impl MockTransport {
    async fn run(&self, command: String) -> Result<CommandOutput> {
        self.state
            .executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ExecutedCommand {
                target: self.name.clone(),
                command: command.clone(),
            });

        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }

        if MockConfig::matches(&self.config.drop_connection, &self.name, &command) {
            return Err(TransportError::connection(&self.name, "mock connection reset"));
        }
        if MockConfig::matches(&self.config.fail_commands, &self.name, &command) {
            return Ok(CommandOutput::failed(self.config.exit_code, "mock failure"));
        }
        Ok(CommandOutput::ok(format!("mock: {command}")))
    }
}

impl Transport for MockTransport {
    fn target_name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        self.run(command.to_string()).await
    }

    async fn transfer(&self, local: &str, remote: &str) -> Result<CommandOutput> {
        self.run(format!("transfer {local} -> {remote}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_commands_and_injects_failures() {
        let connector =
            MockConnector::with_config(
                MockConfig::default().fail_command("web-2", "build").with_exit_code(2),
            );

        let web1 = connector.connect(&Target::local("web-1"), None).await.unwrap();
        let web2 = connector.connect(&Target::local("web-2"), None).await.unwrap();

        assert!(web1.execute("docker compose build").await.unwrap().success);
        let failed = web2.execute("docker compose build").await.unwrap();
        assert!(!failed.success);
        assert_eq!(failed.exit_code, 2);

        assert_eq!(connector.executed().len(), 2);
        assert_eq!(connector.commands_for("web-2"), vec!["docker compose build"]);
    }

    #[tokio::test]
    async fn flaky_connect_recovers() {
        let connector = MockConnector::with_config(MockConfig::default().flaky_connect("web-1", 2));
        let target = Target::local("web-1");

        assert!(connector.connect(&target, None).await.is_err());
        assert!(connector.connect(&target, None).await.is_err());
        assert!(connector.connect(&target, None).await.is_ok());
        assert_eq!(connector.connect_attempts("web-1"), 3);
    }

    #[tokio::test]
    async fn dropped_connection_is_transport_error() {
        let connector = MockConnector::with_config(
            MockConfig::default().drop_connection(ANY_TARGET, "up -d"),
        );
        let transport = connector.connect(&Target::local("web-1"), None).await.unwrap();

        let err = transport.execute("docker compose up -d").await.unwrap_err();
        assert!(err.is_transient());
    }
}
