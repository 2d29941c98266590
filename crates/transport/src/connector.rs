//! Connector for real targets
//!
//! Picks the transport implementation from `Target::transport`.

use std::path::PathBuf;

use contracts::{CredentialHandle, Target, TransportKind};
use tracing::{info, instrument};

use crate::client::{CommandOutput, Connector, Transport};
use crate::error::Result;
use crate::local::LocalShell;
use crate::retry::RetryPolicy;
use crate::ssh::{SshPrograms, SshTransport};

/// Either of the real transports
#[derive(Debug, Clone)]
pub enum AnyTransport {
    Local(LocalShell),
    Ssh(SshTransport),
}

impl Transport for AnyTransport {
    fn target_name(&self) -> &str {
        match self {
            Self::Local(t) => t.target_name(),
            Self::Ssh(t) => t.target_name(),
        }
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        match self {
            Self::Local(t) => t.execute(command).await,
            Self::Ssh(t) => t.execute(command).await,
        }
    }

    async fn transfer(&self, local: &str, remote: &str) -> Result<CommandOutput> {
        match self {
            Self::Local(t) => t.transfer(local, remote).await,
            Self::Ssh(t) => t.transfer(local, remote).await,
        }
    }
}

/// Connector backed by the local shell and the system `ssh` client
#[derive(Debug, Clone)]
pub struct ShellConnector {
    source_dir: PathBuf,
    retry: RetryPolicy,
    programs: SshPrograms,
}

impl ShellConnector {
    /// `source_dir` is the fetched source tree; `retry` bounds per-command
    /// reconnects on ssh targets
    pub fn new(source_dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            source_dir: source_dir.into(),
            retry,
            programs: SshPrograms::default(),
        }
    }

    /// Use other `ssh` / `scp` binaries than the ones on `PATH`
    pub fn with_ssh_programs(mut self, programs: SshPrograms) -> Self {
        self.programs = programs;
        self
    }
}

impl Connector for ShellConnector {
    type Transport = AnyTransport;

    #[instrument(
        name = "connect",
        skip(self, target, credential),
        fields(target_name = %target.name)
    )]
    async fn connect(
        &self,
        target: &Target,
        credential: Option<CredentialHandle>,
    ) -> Result<AnyTransport> {
        match target.transport {
            TransportKind::Local => Ok(AnyTransport::Local(LocalShell::new(
                &target.name,
                &self.source_dir,
            ))),
            TransportKind::Ssh => {
                let ssh = SshTransport::from_target(
                    target,
                    credential.as_ref(),
                    &self.source_dir,
                    self.retry,
                )?
                .with_programs(self.programs.clone());
                ssh.check_connection().await?;
                info!(destination = %target.destination(), "connected");
                Ok(AnyTransport::Ssh(ssh))
            }
        }
    }
}
