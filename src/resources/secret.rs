//! Crunchy Bridge API credentials read from a Kubernetes Secret

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tracing::debug;

use crate::bridgeapi::{CredentialError, CredentialProvider, LoginCred};

/// Default Secret holding the API key pair
pub const DEFAULT_SECRET_NAME: &str = "crunchybridge_api_key";
pub const DEFAULT_SECRET_NAMESPACE: &str = "default";
pub const DEFAULT_KEY_FIELD: &str = "api_key";
pub const DEFAULT_SECRET_FIELD: &str = "api_secret";

/// Reads the current contents of a Secret on every call, so rotated keys
/// are picked up by the next login
#[derive(Clone)]
pub struct KubeSecretCredentialProvider {
    client: Client,
    namespace: String,
    name: String,
    key_field: String,
    secret_field: String,
}

impl KubeSecretCredentialProvider {
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        name: impl Into<String>,
        key_field: impl Into<String>,
        secret_field: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
            key_field: key_field.into(),
            secret_field: secret_field.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for KubeSecretCredentialProvider {
    async fn provide_credential(&self) -> Result<LoginCred, CredentialError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        let secret = api.get(&self.name).await?;
        let cred = credential_from_secret(&secret, &self.key_field, &self.secret_field);
        if cred.is_zero() {
            debug!(
                namespace = %self.namespace,
                name = %self.name,
                "Credential secret has no key or secret set"
            );
        }
        Ok(cred)
    }
}

/// Extract the key pair from a Secret's data
///
/// Missing fields come back empty rather than as an error.
pub fn credential_from_secret(secret: &Secret, key_field: &str, secret_field: &str) -> LoginCred {
    let field = |name: &str| {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(name))
            .map(|value| String::from_utf8_lossy(&value.0).trim().to_string())
            .unwrap_or_default()
    };
    LoginCred::new(field(key_field), field(secret_field))
}
