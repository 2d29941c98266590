//! Secret providers
//!
//! Credentials are resolved by name at connection time and wrapped in a
//! `CredentialHandle` so they never reach logs or the plan.

use std::collections::HashMap;

use contracts::{ContractError, CredentialHandle, SecretProvider};

/// Reads credentials from environment variables
///
/// With a prefix, credential `SSH_KEY` is read from `<prefix>SSH_KEY`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider {
    prefix: Option<String>,
}

impl EnvSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn variable(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{name}"),
            None => name.to_string(),
        }
    }
}

impl SecretProvider for EnvSecretProvider {
    fn lookup(&self, name: &str) -> Result<CredentialHandle, ContractError> {
        let variable = self.variable(name);
        match std::env::var(&variable) {
            Ok(value) if !value.is_empty() => Ok(CredentialHandle::new(name, value)),
            Ok(_) => Err(ContractError::secret(
                name,
                format!("environment variable {variable} is empty"),
            )),
            Err(_) => Err(ContractError::secret(
                name,
                format!("environment variable {variable} is not set"),
            )),
        }
    }
}

/// Fixed in-memory credentials
#[derive(Debug, Clone, Default)]
pub struct StaticSecretProvider {
    values: HashMap<String, String>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl SecretProvider for StaticSecretProvider {
    fn lookup(&self, name: &str) -> Result<CredentialHandle, ContractError> {
        self.values
            .get(name)
            .map(|value| CredentialHandle::new(name, value.clone()))
            .ok_or_else(|| ContractError::secret(name, "unknown credential"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ErrorKind;

    #[test]
    fn env_provider_reads_prefixed_variable() {
        std::env::set_var("DEPLOY_TEST_SECRET_WEB_KEY", "/keys/web");
        let provider = EnvSecretProvider::with_prefix("DEPLOY_TEST_SECRET_");

        let handle = provider.lookup("WEB_KEY").unwrap();
        assert_eq!(handle.name(), "WEB_KEY");
        assert_eq!(handle.expose(), "/keys/web");
    }

    #[test]
    fn env_provider_missing_variable() {
        let provider = EnvSecretProvider::new();
        let err = provider.lookup("DEPLOY_TEST_SECRET_DOES_NOT_EXIST").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("not set"));
    }

    #[test]
    fn static_provider() {
        let provider = StaticSecretProvider::new().with("db", "hunter2");
        assert_eq!(provider.lookup("db").unwrap().expose(), "hunter2");
        assert!(provider.lookup("web").is_err());
    }
}
