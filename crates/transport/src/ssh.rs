//! Secure remote shell transport
//!
//! Shells out to the system `ssh` and `scp` binaries. Authentication is
//! non-interactive (`BatchMode`); the credential handle, when present, names
//! the identity file to use.

use std::path::{Path, PathBuf};

use contracts::{ContractError, CredentialHandle, Target};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::client::{CommandOutput, Transport};
use crate::error::{Result, TransportError};
use crate::retry::RetryPolicy;

/// `ssh` exit status reserved for its own errors
const SSH_CONNECTION_EXIT: i32 = 255;

/// Stderr line prefixes written by the ssh client itself, never by the
/// remote command
const SSH_CLIENT_PREFIXES: [&str; 6] = [
    "ssh:",
    "kex_exchange_identification:",
    "ssh_exchange_identification:",
    "client_loop:",
    "connection closed by",
    "connection reset by",
];

/// Client programs used to reach a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPrograms {
    pub ssh: PathBuf,
    pub scp: PathBuf,
}

impl Default for SshPrograms {
    fn default() -> Self {
        Self {
            ssh: PathBuf::from("ssh"),
            scp: PathBuf::from("scp"),
        }
    }
}

/// Transport for `ssh` targets
#[derive(Debug, Clone)]
pub struct SshTransport {
    name: String,
    destination: String,
    port: u16,
    identity_file: Option<String>,
    source_dir: PathBuf,
    retry: RetryPolicy,
    programs: SshPrograms,
}

impl SshTransport {
    /// Build a transport for `target`
    ///
    /// # Errors
    /// The target declares no host.
    pub fn from_target(
        target: &Target,
        credential: Option<&CredentialHandle>,
        source_dir: impl Into<PathBuf>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        if target.host.is_none() {
            return Err(ContractError::transport(&target.name, "ssh target has no host").into());
        }

        Ok(Self {
            name: target.name.clone(),
            destination: target.destination(),
            port: target.port,
            identity_file: credential
                .map(|c| c.expose().to_string())
                .filter(|path| !path.is_empty()),
            source_dir: source_dir.into(),
            retry,
            programs: SshPrograms::default(),
        })
    }

    pub fn with_programs(mut self, programs: SshPrograms) -> Self {
        self.programs = programs;
        self
    }

    /// Check the target is reachable with a no-op command, single attempt
    #[instrument(name = "ssh_check", skip(self), fields(target_name = %self.name))]
    pub async fn check_connection(&self) -> Result<()> {
        let output = self.run_ssh_once("true").await?;
        if output.success {
            Ok(())
        } else {
            Err(TransportError::connection(
                &self.name,
                format!(
                    "connection check exited with {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
            ))
        }
    }

    fn common_options(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args
    }

    pub(crate) fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = self.common_options();
        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }
        args.push(self.destination.clone());
        args.push(command.to_string());
        args
    }

    pub(crate) fn build_scp_args(&self, local: &Path, remote: &str) -> Vec<String> {
        let mut args = self.common_options();
        if self.port != 22 {
            args.push("-P".to_string());
            args.push(self.port.to_string());
        }
        args.push(local.display().to_string());
        args.push(format!("{}:{}", self.destination, remote));
        args
    }

    async fn run_ssh_once(&self, command: &str) -> Result<CommandOutput> {
        let output = self
            .spawn(&self.programs.ssh, self.build_ssh_args(command))
            .await?;
        if is_ssh_connection_error(&output) {
            return Err(self.connection_error(&output));
        }
        debug!(exit_code = output.exit_code, "remote command finished");
        Ok(output)
    }

    async fn run_scp_once(&self, local: &Path, remote: &str) -> Result<CommandOutput> {
        let output = self
            .spawn(&self.programs.scp, self.build_scp_args(local, remote))
            .await?;
        if is_scp_connection_error(&output) {
            return Err(self.connection_error(&output));
        }
        debug!(exit_code = output.exit_code, "copy finished");
        Ok(output)
    }

    async fn spawn(&self, program: &Path, args: Vec<String>) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TransportError::spawn(&self.name, program.display().to_string(), e))?;
        Ok(CommandOutput::from(output))
    }

    fn connection_error(&self, output: &CommandOutput) -> TransportError {
        TransportError::connection(
            &self.name,
            ssh_client_line(&output.stderr).unwrap_or("ssh connection error"),
        )
    }
}

impl Transport for SshTransport {
    fn target_name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "ssh_execute", skip(self), fields(target_name = %self.name))]
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        self.retry
            .run(&self.name, move |_| self.run_ssh_once(command))
            .await
    }

    #[instrument(name = "ssh_transfer", skip(self), fields(target_name = %self.name))]
    async fn transfer(&self, local: &str, remote: &str) -> Result<CommandOutput> {
        let local_path = self.source_dir.join(local);
        if !local_path.is_file() {
            return Ok(CommandOutput::failed(
                1,
                format!("local file not found: {}", local_path.display()),
            ));
        }

        let local_path = local_path.as_path();
        self.retry
            .run(&self.name, move |_| self.run_scp_once(local_path, remote))
            .await
    }
}

/// First stderr line written by the ssh client
fn ssh_client_line(stderr: &str) -> Option<&str> {
    stderr.lines().map(str::trim).find(|line| {
        let line = line.to_lowercase();
        SSH_CLIENT_PREFIXES.iter().any(|p| line.starts_with(p))
    })
}

/// Did ssh fail to reach the host, as opposed to the remote command failing
///
/// The remote command's own exit code and output never count: only the
/// client's reserved exit status together with a client-written line does.
pub(crate) fn is_ssh_connection_error(output: &CommandOutput) -> bool {
    output.exit_code == SSH_CONNECTION_EXIT && ssh_client_line(&output.stderr).is_some()
}

/// `scp` has no reserved status; its connection errors come from the
/// underlying ssh client
pub(crate) fn is_scp_connection_error(output: &CommandOutput) -> bool {
    !output.success && ssh_client_line(&output.stderr).is_some()
}
