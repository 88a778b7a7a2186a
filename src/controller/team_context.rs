use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;

use crate::backoff::BackoffConfig;
use crate::bridgeapi::{ApiError, ClientBuilder, SessionCache, TeamList};
use crate::config::OperatorConfig;
use crate::controller::context::FailureCounts;
use crate::controller::store::TeamStore;
use crate::health::HealthState;
use crate::resources::secret::KubeSecretCredentialProvider;

/// Team listings under a credential Secret named by a BridgeTeam
#[async_trait]
pub trait TeamDirectory: Send + Sync {
    async fn list_teams(&self, namespace: &str, secret_name: &str) -> Result<TeamList, ApiError>;
}

/// Lists teams through a provider client built for the referenced Secret
///
/// Clients share the operator's session cache, so a BridgeTeam using the
/// operator's own key pair reuses its login.
pub struct KubeTeamDirectory {
    client: Client,
    cache: Arc<SessionCache>,
    api_url: String,
    auth_url: Option<String>,
    key_field: String,
    secret_field: String,
}

impl KubeTeamDirectory {
    pub fn new(client: Client, cache: Arc<SessionCache>, config: &OperatorConfig) -> Self {
        Self {
            client,
            cache,
            api_url: config.api_url.clone(),
            auth_url: config.auth_url.clone(),
            key_field: config.key_field.clone(),
            secret_field: config.secret_field.clone(),
        }
    }
}

#[async_trait]
impl TeamDirectory for KubeTeamDirectory {
    async fn list_teams(&self, namespace: &str, secret_name: &str) -> Result<TeamList, ApiError> {
        let provider = Arc::new(KubeSecretCredentialProvider::new(
            self.client.clone(),
            namespace,
            secret_name,
            &self.key_field,
            &self.secret_field,
        ));
        let mut builder = ClientBuilder::new()
            .api_url(&self.api_url)
            .operator_version(env!("CARGO_PKG_VERSION"))
            .credential_provider(provider);
        if let Some(auth_url) = &self.auth_url {
            builder = builder.auth_url(auth_url);
        }

        let client = builder.build(self.cache.clone()).await?;
        client.list_teams().await
    }
}

/// Shared context for the BridgeTeam controller
#[derive(Clone)]
pub struct TeamContext {
    pub store: Arc<dyn TeamStore>,
    pub directory: Arc<dyn TeamDirectory>,
    /// Requeue schedule for failed reconciles
    pub backoff: BackoffConfig,
    pub health: Option<Arc<HealthState>>,
    pub failures: FailureCounts,
}

impl TeamContext {
    pub fn new(store: Arc<dyn TeamStore>, directory: Arc<dyn TeamDirectory>) -> Self {
        Self {
            store,
            directory,
            backoff: BackoffConfig::default(),
            health: None,
            failures: FailureCounts::default(),
        }
    }

    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}
