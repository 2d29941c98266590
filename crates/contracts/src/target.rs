//! Deployment targets
//!
//! A target names a destination host and how to reach it. Credentials are
//! referenced by name only and resolved through a `SecretProvider` at run time.

use serde::{Deserialize, Serialize};

/// How commands reach a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Run through the local shell
    Local,
    /// Run over `ssh` / `scp`
    #[default]
    Ssh,
}

/// Deployment destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Unique target name, used in logs and selectors
    pub name: String,

    /// Host name or address (required for ssh)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Remote login user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Remote port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Name of the credential to look up, never the secret itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,

    /// Transport used to reach the target
    #[serde(default)]
    pub transport: TransportKind,

    /// Free-form labels usable in stage selectors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_ssh_port() -> u16 {
    22
}

impl Target {
    /// Create a local-shell target
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
            user: None,
            port: default_ssh_port(),
            credential: None,
            transport: TransportKind::Local,
            tags: Vec::new(),
        }
    }

    /// Create an ssh target
    pub fn ssh(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: Some(host.into()),
            user: None,
            port: default_ssh_port(),
            credential: None,
            transport: TransportKind::Ssh,
            tags: Vec::new(),
        }
    }

    /// `user@host` destination string for ssh
    pub fn destination(&self) -> String {
        let host = self.host.as_deref().unwrap_or("localhost");
        match &self.user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
