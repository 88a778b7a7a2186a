//! Wire types for the Crunchy Bridge public API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-side lifecycle state reported by the cluster detail endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterState {
    Unknown,
    Creating,
    Ready,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::Unknown => "unknown",
            ClusterState::Creating => "creating",
            ClusterState::Ready => "ready",
        }
    }
}

/// Body of `POST /clusters`
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub team_id: String,
    #[serde(rename = "plan_id")]
    pub plan: String,
    /// Volume size in GB
    pub storage: i32,
    #[serde(rename = "provider_id")]
    pub provider: String,
    #[serde(rename = "region_id")]
    pub region: String,
    pub major_version: i32,
    pub is_ha: bool,
}

/// Cluster as returned by the listing and detail endpoints
///
/// `state` and `instances` are only populated by the detail endpoint,
/// `replicas` only by listings.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ClusterDetail {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub cpu: i32,
    /// Memory in GB
    #[serde(default)]
    pub memory: i32,
    /// Storage in GB
    #[serde(default)]
    pub storage: i32,
    #[serde(default)]
    pub major_version: i32,
    #[serde(default)]
    pub is_ha: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub oldest_backup: Option<DateTime<Utc>>,
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub region_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub instances: Vec<InstanceDetail>,
    #[serde(default)]
    pub replicas: Vec<ClusterDetail>,
}

impl ClusterDetail {
    /// A detail without an id is the "not found" value of name lookups
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.state == ClusterState::Ready.as_str()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceDetail {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub region_id: String,
    /// primary or read_replica
    #[serde(default, rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ClusterList {
    #[serde(default)]
    pub clusters: Vec<ClusterDetail>,
    #[serde(default)]
    pub total_count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_personal: bool,
}

/// Teams are ordered personal first, then by name
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TeamList {
    #[serde(default)]
    pub teams: Vec<Team>,
}

/// Default connection role of a cluster
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRole {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub uri: String,
}

impl std::fmt::Debug for ConnectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRole")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Response of `POST /access-tokens`
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub id: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
}

/// Default response body when an endpoint does not return its documented type
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ApiMessage {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub request_id: String,
}
