//! Layered error definitions
//!
//! Categorized by source: plan / transport / command / cancellation / providers

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Plan Errors =====
    /// Plan text could not be parsed
    #[error("plan parse error: {message}")]
    PlanParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Plan parsed but failed validation
    #[error("plan validation error at '{field}': {message}")]
    PlanLoad { field: String, message: String },

    // ===== Execution Errors =====
    /// Connection or authentication failure against a target
    #[error("transport error for target '{target}': {message}")]
    Transport { target: String, message: String },

    /// Command exited non-zero
    #[error("command failed on '{target}' in stage '{stage}' (exit {exit_code:?}): {message}")]
    Command {
        target: String,
        stage: String,
        exit_code: Option<i32>,
        message: String,
    },

    /// Run cancelled by the operator
    #[error("run cancelled")]
    Cancelled,

    // ===== Provider Errors =====
    /// Secret lookup failed
    #[error("secret '{name}' unavailable: {message}")]
    Secret { name: String, message: String },

    /// Source checkout failed
    #[error("source checkout of '{reference}' failed: {message}")]
    Source { reference: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Coarse error classification, used for reporting and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PlanLoad,
    Transport,
    Command,
    Cancellation,
    Other,
}

impl ContractError {
    /// Create plan parse error
    pub fn plan_parse(message: impl Into<String>) -> Self {
        Self::PlanParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create plan validation error
    pub fn plan_load(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PlanLoad {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create transport error
    pub fn transport(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create command error
    pub fn command(
        target: impl Into<String>,
        stage: impl Into<String>,
        exit_code: Option<i32>,
        message: impl Into<String>,
    ) -> Self {
        Self::Command {
            target: target.into(),
            stage: stage.into(),
            exit_code,
            message: message.into(),
        }
    }

    /// Create secret lookup error
    pub fn secret(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Secret {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create source checkout error
    pub fn source(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PlanParse { .. } | Self::PlanLoad { .. } => ErrorKind::PlanLoad,
            // A credential that cannot be resolved means the target is unreachable
            Self::Transport { .. } | Self::Secret { .. } => ErrorKind::Transport,
            Self::Command { .. } => ErrorKind::Command,
            Self::Cancelled => ErrorKind::Cancellation,
            Self::Source { .. } | Self::Io(_) | Self::Other(_) => ErrorKind::Other,
        }
    }
}
