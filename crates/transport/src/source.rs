//! Source checkout providers
//!
//! The source tree is fetched once, before any stage runs. Transfers and
//! local-shell commands resolve relative paths against it.

use std::path::{Path, PathBuf};

use contracts::{ContractError, SourceSpec};
use tokio::process::Command;
use tracing::{info, instrument};

/// Fetch a source tree at a ref
#[trait_variant::make(SourceProvider: Send)]
pub trait LocalSourceProvider {
    /// Make the tree for `reference` available locally and return its root
    async fn fetch(&self, reference: &str) -> Result<PathBuf, ContractError>;
}

/// Existing directory, the ref is ignored
#[derive(Debug, Clone)]
pub struct LocalSource {
    path: PathBuf,
}

impl LocalSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceProvider for LocalSource {
    async fn fetch(&self, reference: &str) -> Result<PathBuf, ContractError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => Ok(self.path.clone()),
            Ok(_) => Err(ContractError::source(
                reference,
                format!("{} is not a directory", self.path.display()),
            )),
            Err(e) => Err(ContractError::source(
                reference,
                format!("cannot access {}: {e}", self.path.display()),
            )),
        }
    }
}

/// Shallow `git clone` into a work directory
#[derive(Debug, Clone)]
pub struct GitSource {
    repository: String,
    workdir: PathBuf,
}

impl GitSource {
    pub fn new(repository: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            workdir: workdir.into(),
        }
    }

    fn checkout_dir(&self, reference: &str) -> PathBuf {
        let name: String = reference
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.workdir.join(format!("checkout-{name}"))
    }
}

impl SourceProvider for GitSource {
    #[instrument(name = "git_fetch", skip(self), fields(repository = %self.repository))]
    async fn fetch(&self, reference: &str) -> Result<PathBuf, ContractError> {
        let dest = self.checkout_dir(reference);
        if tokio::fs::metadata(&dest).await.is_ok() {
            tokio::fs::remove_dir_all(&dest).await?;
        }
        tokio::fs::create_dir_all(&self.workdir).await?;

        let output = Command::new("git")
            .args(["clone", "--depth", "1", "--branch", reference])
            .arg(&self.repository)
            .arg(&dest)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ContractError::source(reference, format!("cannot run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContractError::source(reference, stderr.trim().to_string()));
        }

        info!(path = %dest.display(), "source checked out");
        Ok(dest)
    }
}

/// Fetch the tree declared by a plan
///
/// Local paths are resolved against `plan_dir`; `reference_override` replaces
/// the declared git ref. Without a declaration the plan directory is used.
pub async fn fetch_declared(
    spec: Option<&SourceSpec>,
    plan_dir: &Path,
    workdir: &Path,
    reference_override: Option<&str>,
) -> Result<PathBuf, ContractError> {
    match spec {
        None => SourceProvider::fetch(&LocalSource::new(plan_dir), "local").await,
        Some(SourceSpec::Local { path }) => {
            SourceProvider::fetch(&LocalSource::new(plan_dir.join(path)), "local").await
        }
        Some(SourceSpec::Git {
            repository,
            reference,
        }) => {
            let reference = reference_override.unwrap_or(reference.as_str());
            let source = GitSource::new(repository.clone(), workdir);
            SourceProvider::fetch(&source, reference).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ErrorKind;

    #[tokio::test]
    async fn local_source_returns_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalSource::new(dir.path());
        let path = SourceProvider::fetch(&source, "main").await.unwrap();
        assert_eq!(path, dir.path());
    }

    #[tokio::test]
    async fn local_source_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalSource::new(dir.path().join("nope"));
        let err = SourceProvider::fetch(&source, "main").await.unwrap_err();
        assert!(matches!(err, ContractError::Source { .. }));
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn git_source_failure_is_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = GitSource::new(
            dir.path().join("no-such-repo").display().to_string(),
            dir.path().join("work"),
        );
        let err = SourceProvider::fetch(&source, "main").await.unwrap_err();
        assert!(matches!(err, ContractError::Source { .. }));
    }

    #[tokio::test]
    async fn declared_local_path_is_relative_to_plan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("app")).unwrap();
        let spec = SourceSpec::Local { path: "app".into() };

        let path = fetch_declared(Some(&spec), dir.path(), dir.path(), None)
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("app"));
    }

    #[test]
    fn checkout_dir_sanitizes_ref() {
        let source = GitSource::new("repo", "/work");
        assert_eq!(
            source.checkout_dir("release/1.2"),
            PathBuf::from("/work/checkout-release_1.2")
        );
    }
}
