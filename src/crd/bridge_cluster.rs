use std::str::FromStr;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// BridgeCluster is the Schema for the bridgeclusters API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "crunchybridge.crunchydata.com",
    version = "v1alpha1",
    kind = "BridgeCluster",
    plural = "bridgeclusters",
    shortname = "bc",
    namespaced,
    status = "BridgeClusterStatus",
    printcolumn = r#"{"name":"Cluster", "type":"string", "jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Plan", "type":"string", "jsonPath":".spec.plan"}"#,
    printcolumn = r#"{"name":"Provider", "type":"string", "jsonPath":".spec.provider"}"#,
    printcolumn = r#"{"name":"Region", "type":"string", "jsonPath":".spec.region"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BridgeClusterSpec {
    /// Cluster name within Crunchy Bridge, unique per team
    pub name: String,

    /// Team to create the cluster in
    /// Defaults to the operator's configured team, then its personal team
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,

    /// Provisioning plan (e.g. hobby-2, standard-8, or trial)
    pub plan: String,

    /// Database volume size in gigabytes
    pub storage: i32,

    /// Cloud infrastructure provider (e.g. aws, gcp, azure)
    pub provider: String,

    /// Deployment region within the provider (e.g. us-east-1)
    pub region: String,

    /// PostgreSQL major version (e.g. 12, 13)
    pub pg_major_version: i32,

    /// Deploy the additional nodes needed for high availability
    #[serde(default)]
    pub enable_ha: bool,
}

/// Status of the BridgeCluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeClusterStatus {
    /// Lifecycle phase: pending, creating, ready or deleting
    ///
    /// Kept as a string so a corrupted value surfaces as a reconcile error
    /// instead of failing to decode the whole object.
    #[serde(default)]
    pub phase: String,

    /// Last status write by the controller (RFC3339), unrelated to cluster.updatedAt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,

    /// Cluster detail mirrored from Crunchy Bridge
    #[serde(default)]
    pub cluster: ClusterStatus,

    /// Non-user-specific connection information
    #[serde(default)]
    pub connection: ConnectionStatus,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Crunchy Bridge cluster identifier
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub team_id: String,

    /// Plan-allocated CPUs
    #[serde(default)]
    pub cpu: i32,

    /// Plan-allocated memory in gigabytes
    #[serde(default)]
    pub memory: i32,

    /// Volume size in gigabytes
    #[serde(default)]
    pub storage: i32,

    #[serde(default)]
    pub major_version: i32,

    #[serde(default)]
    pub ha_enabled: bool,

    /// Creation time as known to Crunchy Bridge (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Last provider-side change (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(default)]
    pub provider_id: String,

    #[serde(default)]
    pub region_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Connection URI without user information
    /// (e.g. postgres://p.fepkwudi6.example.com:5432/postgres)
    #[serde(default)]
    pub connect_string: String,

    /// Role that bound application users inherit their permissions from
    #[serde(default)]
    pub parent_db_role: String,

    /// Initial database created with the cluster
    #[serde(default)]
    pub database_name: String,
}

/// Cluster lifecycle phase
///
/// Ordered: `Unknown < Pending < Creating < Ready`. `Deleting` sits outside
/// the forward order and is entered only from a deletion request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClusterPhase {
    /// No phase recorded yet
    #[default]
    Unknown,
    /// Finalizer attached, create not yet accepted
    Pending,
    /// Create accepted, provisioning in progress
    Creating,
    /// Provisioning complete
    Ready,
    /// Provider cluster being removed
    Deleting,
}

impl ClusterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterPhase::Unknown => "unknown",
            ClusterPhase::Pending => "pending",
            ClusterPhase::Creating => "creating",
            ClusterPhase::Ready => "ready",
            ClusterPhase::Deleting => "deleting",
        }
    }
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "unknown" => Ok(ClusterPhase::Unknown),
            "pending" => Ok(ClusterPhase::Pending),
            "creating" => Ok(ClusterPhase::Creating),
            "ready" => Ok(ClusterPhase::Ready),
            "deleting" => Ok(ClusterPhase::Deleting),
            other => Err(other.to_string()),
        }
    }
}

impl BridgeCluster {
    /// Raw phase string from status, empty when no status was written
    pub fn phase_str(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.phase.as_str())
            .unwrap_or_default()
    }

    /// Provider cluster id recorded in status, if any
    pub fn cluster_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.cluster.id.as_str())
            .filter(|id| !id.is_empty())
    }
}
