//! Transport abstraction
//!
//! A `Connector` turns a declared `Target` into a live `Transport`; the
//! engine only ever talks to these two traits, so real shells and the mock
//! implementation are interchangeable.

use std::future::Future;
use std::process::Output;

use contracts::{CredentialHandle, Target};

use crate::error::Result;

/// Captured result of one command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            success: true,
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            success: false,
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(out: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            // Killed by a signal
            exit_code: out.status.code().unwrap_or(-1),
        }
    }
}

/// Connection to one target
///
/// Both operations resolve to `Ok` whenever the command actually ran, even if
/// it exited non-zero. `Err` is reserved for connection level failures.
pub trait Transport: Send + Sync {
    /// Name of the target this transport reaches
    fn target_name(&self) -> &str;

    /// Run a shell command on the target
    fn execute(&self, command: &str) -> impl Future<Output = Result<CommandOutput>> + Send;

    /// Copy `local` (relative to the fetched source tree) to `remote` on the target
    fn transfer(
        &self,
        local: &str,
        remote: &str,
    ) -> impl Future<Output = Result<CommandOutput>> + Send;
}

/// Factory for transports
pub trait Connector: Send + Sync {
    type Transport: Transport + 'static;

    /// Establish a connection to `target`
    ///
    /// Makes a single attempt; callers own the retry policy.
    fn connect(
        &self,
        target: &Target,
        credential: Option<CredentialHandle>,
    ) -> impl Future<Output = Result<Self::Transport>> + Send;
}
