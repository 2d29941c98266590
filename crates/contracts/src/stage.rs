//! Stage definitions
//!
//! A stage is a named list of commands applied to a set of targets, together
//! with the policy to follow when one of its commands fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Target;

/// What to do when a stage fails for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop every later stage for this target
    #[default]
    Abort,
    /// Record the failure and keep going
    Continue,
    /// Run the stage's compensating commands, then stop
    RollbackToPrevious,
}

/// Which targets a stage applies to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSelector {
    /// Every target in the run
    #[default]
    All,
    /// Explicit target names
    Names(Vec<String>),
    /// Targets carrying a tag
    Tag { tag: String },
}

impl TargetSelector {
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Does this selector pick `target`
    pub fn matches(&self, target: &Target) -> bool {
        match self {
            Self::All => true,
            Self::Names(names) => names.iter().any(|n| n == &target.name),
            Self::Tag { tag } => target.has_tag(tag),
        }
    }
}

/// File copy from the source tree to a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSpec {
    /// Path relative to the fetched source tree
    pub local: String,
    /// Destination path on the target
    pub remote: String,
}

/// Single unit of work inside a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Shell command line, `${NAME}` placeholders are expanded from plan variables
    Shell(String),
    /// File transfer
    Transfer { transfer: TransferSpec },
}

impl Command {
    /// Expand `${NAME}` placeholders
    ///
    /// Unknown names are left untouched so the remote shell can resolve them.
    pub fn render(&self, variables: &BTreeMap<String, String>) -> Command {
        match self {
            Self::Shell(line) => Self::Shell(expand_variables(line, variables)),
            Self::Transfer { transfer } => Self::Transfer {
                transfer: TransferSpec {
                    local: expand_variables(&transfer.local, variables),
                    remote: expand_variables(&transfer.remote, variables),
                },
            },
        }
    }

    /// Human readable form, used in logs and records
    pub fn describe(&self) -> String {
        match self {
            Self::Shell(line) => line.clone(),
            Self::Transfer { transfer } => {
                format!("transfer {} -> {}", transfer.local, transfer.remote)
            }
        }
    }
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        Self::Shell(line.to_string())
    }
}

/// Named unit of work with a failure policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Unique stage name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Commands run in order, the first failure fails the stage
    pub commands: Vec<Command>,

    /// Target selection, all targets when omitted
    #[serde(default, skip_serializing_if = "TargetSelector::is_all")]
    pub targets: TargetSelector,

    #[serde(default)]
    pub on_failure: FailurePolicy,

    /// Compensating commands for `rollback-to-previous`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback: Vec<Command>,

    /// Stages that must have succeeded on the same target first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,

    /// Idempotent cleanup stage, runs regardless of earlier outcomes
    #[serde(default)]
    pub cleanup: bool,

    /// Per-command timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Stage {
    /// Create a stage with default policy and selector
    pub fn new<I, C>(name: impl Into<String>, commands: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Command>,
    {
        Self {
            name: name.into(),
            description: None,
            commands: commands.into_iter().map(Into::into).collect(),
            targets: TargetSelector::All,
            on_failure: FailurePolicy::Abort,
            rollback: Vec::new(),
            needs: Vec::new(),
            cleanup: false,
            timeout_secs: None,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn with_rollback<I, C>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Command>,
    {
        self.rollback = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn as_cleanup(mut self) -> Self {
        self.cleanup = true;
        self
    }
}

/// Expand `${NAME}` placeholders in `input`
pub fn expand_variables(input: &str, variables: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("NO_CACHE".to_string(), "--no-cache".to_string()),
            ("APP_DIR".to_string(), "/srv/app".to_string()),
        ])
    }

    #[test]
    fn expands_known_variables() {
        let out = expand_variables("cd ${APP_DIR} && docker compose build ${NO_CACHE}", &vars());
        assert_eq!(out, "cd /srv/app && docker compose build --no-cache");
    }

    #[test]
    fn leaves_unknown_and_unterminated_placeholders() {
        assert_eq!(expand_variables("echo ${HOME}", &vars()), "echo ${HOME}");
        assert_eq!(expand_variables("echo ${APP_DIR", &vars()), "echo ${APP_DIR");
    }

    #[test]
    fn selector_matching() {
        let mut web = Target::ssh("web-1", "10.0.0.1");
        web.tags = vec!["web".into()];
        let db = Target::ssh("db-1", "10.0.0.2");

        assert!(TargetSelector::All.matches(&db));
        assert!(TargetSelector::Names(vec!["db-1".into()]).matches(&db));
        assert!(!TargetSelector::Names(vec!["db-1".into()]).matches(&web));
        assert!(TargetSelector::Tag { tag: "web".into() }.matches(&web));
        assert!(!TargetSelector::Tag { tag: "web".into() }.matches(&db));
    }

    #[test]
    fn command_forms_deserialize() {
        let commands: Vec<Command> = serde_json::from_str(
            r#"[
                "docker compose up -d",
                { "transfer": { "local": "a.yml", "remote": "/srv/a.yml" } }
            ]"#,
        )
        .unwrap();
        assert_eq!(commands[0], Command::Shell("docker compose up -d".into()));
        assert!(matches!(commands[1], Command::Transfer { .. }));
        assert_eq!(commands[1].describe(), "transfer a.yml -> /srv/a.yml");
    }

    #[test]
    fn policy_uses_kebab_case() {
        let policy: FailurePolicy = serde_json::from_str(r#""rollback-to-previous""#).unwrap();
        assert_eq!(policy, FailurePolicy::RollbackToPrevious);
    }
}
