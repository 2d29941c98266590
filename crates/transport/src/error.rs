//! Transport error types

use contracts::{ContractError, ErrorKind};
use thiserror::Error;

/// Transport specific error
#[derive(Debug, Error)]
pub enum TransportError {
    /// Target unreachable or connection dropped
    #[error("connection to '{target}' failed: {message}")]
    Connection { target: String, message: String },

    /// Local helper program could not be started
    #[error("failed to spawn '{program}' for '{target}': {source}")]
    Spawn {
        target: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl TransportError {
    /// Create connection error
    pub fn connection(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create spawn error
    pub fn spawn(
        target: impl Into<String>,
        program: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Spawn {
            target: target.into(),
            program: program.into(),
            source,
        }
    }

    /// Worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::Spawn { .. } => ErrorKind::Transport,
            Self::Contract(e) => e.kind(),
        }
    }
}

impl From<TransportError> for ContractError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connection { target, message } => {
                ContractError::transport(target, message)
            }
            TransportError::Spawn {
                target,
                program,
                source,
            } => ContractError::transport(target, format!("cannot run {program}: {source}")),
            TransportError::Contract(e) => e,
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, TransportError>;
