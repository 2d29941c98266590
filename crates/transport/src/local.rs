//! Local shell transport
//!
//! Commands run through `sh -c` inside the fetched source tree; transfers are
//! plain file copies.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::client::{CommandOutput, Transport};
use crate::error::{Result, TransportError};

/// Transport for targets reached through the local shell
#[derive(Debug, Clone)]
pub struct LocalShell {
    name: String,
    workdir: PathBuf,
}

impl LocalShell {
    pub fn new(name: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }
}

impl Transport for LocalShell {
    fn target_name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "local_execute", skip(self), fields(target_name = %self.name))]
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TransportError::spawn(&self.name, "sh", e))?;

        let output = CommandOutput::from(output);
        debug!(exit_code = output.exit_code, "command finished");
        Ok(output)
    }

    #[instrument(name = "local_transfer", skip(self), fields(target_name = %self.name))]
    async fn transfer(&self, local: &str, remote: &str) -> Result<CommandOutput> {
        let from = self.resolve(local);
        let to = self.resolve(remote);

        if let Some(parent) = to.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(CommandOutput::failed(
                    1,
                    format!("cannot create {}: {e}", parent.display()),
                ));
            }
        }

        match tokio::fs::copy(&from, &to).await {
            Ok(bytes) => Ok(CommandOutput::ok(format!(
                "copied {bytes} bytes to {}",
                to.display()
            ))),
            Err(e) => Ok(CommandOutput::failed(
                1,
                format!("cannot copy {} to {}: {e}", from.display(), to.display()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let shell = LocalShell::new("local", dir.path());

        let ok = shell.execute("echo hello").await.unwrap();
        assert!(ok.success);
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = shell.execute("echo oops >&2; exit 3").await.unwrap();
        assert!(!failed.success);
        assert_eq!(failed.exit_code, 3);
        assert_eq!(failed.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn execute_runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let shell = LocalShell::new("local", dir.path());

        let out = shell.execute("cat marker.txt").await.unwrap();
        assert_eq!(out.stdout, "here");
    }

    #[tokio::test]
    async fn transfer_copies_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("compose.yml"), "services: {}").unwrap();
        let shell = LocalShell::new("local", dir.path());

        let out = shell
            .transfer("compose.yml", "deploy/app/compose.yml")
            .await
            .unwrap();
        assert!(out.success, "{out:?}");
        let copied = std::fs::read_to_string(dir.path().join("deploy/app/compose.yml")).unwrap();
        assert_eq!(copied, "services: {}");
    }

    #[tokio::test]
    async fn transfer_of_missing_file_is_a_command_failure() {
        let dir = tempfile::tempdir().unwrap();
        let shell = LocalShell::new("local", dir.path());

        let out = shell.transfer("missing.yml", "out.yml").await.unwrap();
        assert!(!out.success);
        assert!(out.stderr.contains("missing.yml"));
    }
}
