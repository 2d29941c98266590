//! Credential handles
//!
//! Plans reference credentials by name. A `SecretProvider` turns the name into
//! an opaque handle at run time; the handle never prints its value.

use std::fmt;

use crate::ContractError;

/// Opaque credential value
///
/// `Debug` and `Display` are redacted. Call `expose` only at the point of use.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialHandle {
    name: String,
    value: String,
}

impl CredentialHandle {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Credential reference name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw secret value
    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=<redacted>", self.name)
    }
}

/// Secret lookup interface
pub trait SecretProvider: Send + Sync {
    /// Resolve a credential reference
    fn lookup(&self, name: &str) -> Result<CredentialHandle, ContractError>;
}
