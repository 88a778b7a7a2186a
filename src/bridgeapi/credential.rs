//! Credential capability consumed by the session manager

use async_trait::async_trait;
use thiserror::Error;

/// Failure to retrieve a credential from its source
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Credential source unavailable: {0}")]
    Unavailable(String),
}

/// API key/secret pair used for token issuance
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LoginCred {
    pub key: String,
    pub secret: String,
}

impl LoginCred {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }

    /// True when neither field is set, i.e. the source is not configured yet
    pub fn is_zero(&self) -> bool {
        self.key.is_empty() && self.secret.is_empty()
    }
}

// Keep the secret out of logs
impl std::fmt::Debug for LoginCred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCred")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Source of login credentials
///
/// Implementations fetch from wherever secrets live. Present-but-empty
/// fields are returned as a zero [`LoginCred`], not as an error.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn provide_credential(&self) -> Result<LoginCred, CredentialError>;
}

/// A fixed credential pair is its own provider
#[async_trait]
impl CredentialProvider for LoginCred {
    async fn provide_credential(&self) -> Result<LoginCred, CredentialError> {
        Ok(self.clone())
    }
}
