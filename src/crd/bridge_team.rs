use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// BridgeTeam is the Schema for the bridgeteams API
///
/// Lists the Crunchy Bridge teams visible to an API key pair, so cluster
/// specs can name a team id without looking it up by hand.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "crunchybridge.crunchydata.com",
    version = "v1alpha1",
    kind = "BridgeTeam",
    plural = "bridgeteams",
    shortname = "bt",
    namespaced,
    status = "BridgeTeamStatus",
    printcolumn = r#"{"name":"Secret", "type":"string", "jsonPath":".spec.credentialsRef.name"}"#,
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"SpecSynced\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BridgeTeamSpec {
    /// Secret holding the API key pair to list teams with
    pub credentials_ref: SecretReference,
}

/// Namespaced reference to a Secret
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Secret name
    pub name: String,

    /// Secret namespace, defaults to the BridgeTeam's own namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Status of the BridgeTeam
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeTeamStatus {
    /// Conditions representing the latest discovery attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Teams the key pair belongs to, in provider order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teams: Vec<TeamStatus>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamStatus {
    /// Team id to use as a cluster's teamId
    pub id: String,

    /// Team name; the personal team is reported as "Personal"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl BridgeTeam {
    /// Namespace of the credential Secret, falling back to this object's
    pub fn credentials_namespace(&self) -> Option<&str> {
        self.spec
            .credentials_ref
            .namespace
            .as_deref()
            .filter(|ns| !ns.trim().is_empty())
            .or(self.metadata.namespace.as_deref())
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.type_ == type_))
    }
}
