//! Typed operations over the provider's HTTP API
//!
//! Every call prechecks the shared login first. A session that is not
//! `Active` fails the call before anything is sent.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridgeapi::BRIDGE_OPERATOR_NS;
use crate::bridgeapi::cache::SessionCache;
use crate::bridgeapi::credential::CredentialProvider;
use crate::bridgeapi::error::{ApiError, Result};
use crate::bridgeapi::login::{LoginState, Session};
use crate::bridgeapi::types::{
    ApiMessage, ClusterDetail, ClusterList, ConnectionRole, CreateRequest, TeamList,
};

const ROUTE_CLUSTERS: &str = "/clusters";
const ROUTE_TEAMS: &str = "/teams";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Idempotency key for a create payload
///
/// Name-based so that replaying the exact same body yields the same key.
pub fn idempotency_key(payload: &[u8]) -> Uuid {
    Uuid::new_v5(&BRIDGE_OPERATOR_NS, payload)
}

/// Provider operations used by the cluster controller
///
/// Abstracted so the reconciler can run against a fake provider in tests.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    async fn create_cluster(&self, request: &CreateRequest) -> Result<()>;

    async fn cluster_detail(&self, id: &str) -> Result<ClusterDetail>;

    /// Empty detail, not an error, when no cluster has this name
    async fn cluster_by_name(&self, name: &str) -> Result<ClusterDetail>;

    async fn delete_cluster(&self, id: &str) -> Result<()>;

    async fn default_conn_role(&self, id: &str) -> Result<ConnectionRole>;

    async fn default_team_id(&self) -> Result<String>;

    fn login_state(&self) -> LoginState;
}

/// Builder for [`Client`]
#[derive(Default)]
pub struct ClientBuilder {
    api_url: Option<String>,
    auth_url: Option<String>,
    http: Option<reqwest::Client>,
    version: Option<String>,
    provider: Option<Arc<dyn CredentialProvider>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Token endpoint base, defaults to the API URL
    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Operator version reported in the `User-Agent` header
    pub fn operator_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Validate the configuration and attach to a shared session
    pub async fn build(self, cache: Arc<SessionCache>) -> Result<Client> {
        let api_url = normalize_url(self.api_url.as_deref().unwrap_or_default())?;
        let auth_url = match self.auth_url.as_deref() {
            Some(url) if !url.trim().is_empty() => normalize_url(url)?,
            _ => api_url.clone(),
        };
        let provider = self.provider.ok_or(ApiError::CredUnset)?;

        let session = cache.get_session(&auth_url, provider).await?;
        let version = self
            .version
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

        info!(api_url = %api_url, auth_url = %auth_url, "Created provider API client");
        Ok(Client {
            api_url,
            http: self.http.unwrap_or_default(),
            user_agent: format!("CrunchyBridgeOperator/{}", version.trim()),
            cache,
            session,
        })
    }
}

/// Check the URL parses and strip any trailing slash
fn normalize_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::ApiUnset);
    }
    Url::parse(raw).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))?;
    Ok(raw.trim_end_matches('/').to_string())
}

/// Provider API client bound to one shared session
///
/// Dropping the client releases its reference on the session.
pub struct Client {
    api_url: String,
    http: reqwest::Client,
    user_agent: String,
    cache: Arc<SessionCache>,
    session: Arc<Session>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("api_url", &self.api_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.cache.release(&self.session);
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Ensure the session is usable before sending anything
    async fn precheck(&self) -> Result<()> {
        self.session.ping().await;
        self.session.state().to_error()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(self.session.token())
            .header(USER_AGENT, &self.user_agent)
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            debug!(status, what, "Unexpected status from provider");
            return Err(status_error(response).await);
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn create_cluster(&self, request: &CreateRequest) -> Result<()> {
        self.precheck().await?;

        let payload = serde_json::to_vec(request)?;
        let key = idempotency_key(&payload);
        let response = self
            .request(Method::POST, ROUTE_CLUSTERS)
            .header(CONTENT_TYPE, "application/json")
            .header(IDEMPOTENCY_HEADER, key.to_string())
            .body(payload)
            .send()
            .await?;

        match response.status().as_u16() {
            201 => {
                info!(name = %request.name, idempotency_key = %key, "Cluster create accepted");
                Ok(())
            }
            400 => {
                let message = api_message(response).await;
                info!(name = %request.name, message = %message.message, request_id = %message.request_id, "Create rejected as bad request");
                Err(ApiError::BadRequest(message.message))
            }
            409 => {
                let message = api_message(response).await;
                info!(name = %request.name, message = %message.message, request_id = %message.request_id, "Create rejected as conflict");
                Err(ApiError::Conflict(message.message))
            }
            status => {
                warn!(name = %request.name, status, "Unrecognized status from create call");
                Ok(())
            }
        }
    }

    pub async fn list_teams(&self) -> Result<TeamList> {
        self.precheck().await?;
        self.get_json(self.request(Method::GET, ROUTE_TEAMS), "team list")
            .await
    }

    pub async fn list_team_clusters(&self, team_id: &str) -> Result<ClusterList> {
        self.precheck().await?;
        let request = self
            .request(Method::GET, ROUTE_CLUSTERS)
            .query(&[("team_id", team_id)]);
        self.get_json(request, "team cluster list").await
    }

    /// Every cluster visible to the login, one listing per team
    ///
    /// Results keep the provider's order: teams personal first then by
    /// name, clusters by name within a team.
    pub async fn list_all_clusters(&self) -> Result<Vec<ClusterDetail>> {
        let teams = self.list_teams().await?;
        let mut clusters = Vec::new();
        for team in &teams.teams {
            let list = self.list_team_clusters(&team.id).await?;
            clusters.extend(list.clusters);
        }
        Ok(clusters)
    }

    pub async fn cluster_by_name(&self, name: &str) -> Result<ClusterDetail> {
        let clusters = self.list_all_clusters().await?;
        // Listings omit the lifecycle state, so fetch detail for the match
        match clusters.into_iter().find(|cluster| cluster.name == name) {
            Some(cluster) => self.cluster_detail(&cluster.id).await,
            None => Ok(ClusterDetail::default()),
        }
    }

    pub async fn cluster_detail(&self, id: &str) -> Result<ClusterDetail> {
        self.precheck().await?;
        let path = format!("{ROUTE_CLUSTERS}/{id}");
        self.get_json(self.request(Method::GET, &path), "cluster detail")
            .await
    }

    pub async fn delete_cluster(&self, id: &str) -> Result<()> {
        self.precheck().await?;
        let path = format!("{ROUTE_CLUSTERS}/{id}");
        let response = self.request(Method::DELETE, &path).send().await?;
        match response.status().as_u16() {
            200 | 204 => {
                info!(cluster_id = %id, "Cluster delete accepted");
                Ok(())
            }
            _ => Err(status_error(response).await),
        }
    }

    pub async fn default_conn_role(&self, id: &str) -> Result<ConnectionRole> {
        self.precheck().await?;
        let path = format!("{ROUTE_CLUSTERS}/{id}/roles/postgres");
        self.get_json(self.request(Method::GET, &path), "cluster role")
            .await
    }

    pub async fn default_team_id(&self) -> Result<String> {
        let teams = self.list_teams().await?;
        teams
            .teams
            .into_iter()
            .find(|team| team.is_personal)
            .map(|team| team.id)
            .ok_or(ApiError::NoPersonalTeam)
    }

    pub fn login_state(&self) -> LoginState {
        self.session.state()
    }
}

#[async_trait]
impl BridgeApi for Client {
    async fn create_cluster(&self, request: &CreateRequest) -> Result<()> {
        Client::create_cluster(self, request).await
    }

    async fn cluster_detail(&self, id: &str) -> Result<ClusterDetail> {
        Client::cluster_detail(self, id).await
    }

    async fn cluster_by_name(&self, name: &str) -> Result<ClusterDetail> {
        Client::cluster_by_name(self, name).await
    }

    async fn delete_cluster(&self, id: &str) -> Result<()> {
        Client::delete_cluster(self, id).await
    }

    async fn default_conn_role(&self, id: &str) -> Result<ConnectionRole> {
        Client::default_conn_role(self, id).await
    }

    async fn default_team_id(&self) -> Result<String> {
        Client::default_team_id(self).await
    }

    fn login_state(&self) -> LoginState {
        Client::login_state(self)
    }
}

/// Decode the provider's error body, falling back to a generic message
async fn api_message(response: Response) -> ApiMessage {
    let decoded = match response.bytes().await {
        Ok(body) => serde_json::from_slice::<ApiMessage>(&body).ok(),
        Err(_) => None,
    };
    decoded.unwrap_or_else(|| ApiMessage {
        message: "unable to retrieve further error details".to_string(),
        request_id: String::new(),
    })
}

async fn status_error(response: Response) -> ApiError {
    match response.status().as_u16() {
        400 => ApiError::BadRequest(api_message(response).await.message),
        401 | 403 => ApiError::BadCredentials,
        404 => ApiError::NotFound,
        409 => ApiError::Conflict(api_message(response).await.message),
        code => ApiError::UnexpectedStatus(code),
    }
}
