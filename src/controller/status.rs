//! Status updates for BridgeCluster and BridgeTeam resources
//!
//! Pure helpers that fold provider observations into a status object. The
//! reconcilers decide when the result gets written.

use chrono::{SecondsFormat, Utc};
use reqwest::Url;

use crate::bridgeapi::{ClusterDetail, ConnectionRole, TeamList};
use crate::controller::error::{Error, Result};
use crate::crd::{
    BridgeClusterStatus, ClusterPhase, ClusterStatus, Condition, ConnectionStatus, TeamStatus,
};

/// Condition types
pub mod condition_types {
    /// The last discovery against the provider succeeded
    pub const SPEC_SYNCED: &str = "SpecSynced";
}

/// Condition reasons
pub mod condition_reasons {
    pub const SYNC_OK: &str = "SyncOK";
    /// Credentials could not be read or were refused
    pub const AUTHENTICATION_ERROR: &str = "AuthenticationError";
    /// The provider failed the request
    pub const BACKEND_ERROR: &str = "BackendError";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
}

/// Display name of the personal team
pub const PERSONAL_TEAM_NAME: &str = "Personal";

fn rfc3339(ts: Option<chrono::DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Record the controller's write time
pub fn stamp(status: &mut BridgeClusterStatus) {
    status.last_update = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
}

pub fn set_phase(status: &mut BridgeClusterStatus, phase: ClusterPhase) {
    status.phase = phase.as_str().to_string();
    stamp(status);
}

/// Copy provider detail into status
///
/// Detail without an id is rejected; nothing is changed in that case.
pub fn mirror_detail(status: &mut BridgeClusterStatus, detail: &ClusterDetail) -> Result<()> {
    if detail.id.is_empty() {
        return Err(Error::InvalidDetail("cluster detail has no id".to_string()));
    }

    status.cluster = ClusterStatus {
        id: detail.id.clone(),
        name: detail.name.clone(),
        team_id: detail.team_id.clone(),
        cpu: detail.cpu,
        memory: detail.memory,
        storage: detail.storage,
        major_version: detail.major_version,
        ha_enabled: detail.is_ha,
        created_at: rfc3339(detail.created_at),
        updated_at: rfc3339(detail.updated_at),
        provider_id: detail.provider_id.clone(),
        region_id: detail.region_id.clone(),
    };
    Ok(())
}

/// Record the default role's connection info without its credentials
pub fn apply_connection_role(status: &mut BridgeClusterStatus, role: &ConnectionRole) -> Result<()> {
    let (connect_string, database_name) = strip_user_info(&role.uri)?;
    status.connection = ConnectionStatus {
        connect_string,
        parent_db_role: role.name.clone(),
        database_name,
    };
    Ok(())
}

/// Remove user and password from a connection URI
///
/// Returns the cleaned URI and the database name taken from its path.
pub fn strip_user_info(uri: &str) -> Result<(String, String)> {
    let mut url =
        Url::parse(uri).map_err(|e| Error::InvalidDetail(format!("connection URI: {e}")))?;
    url.set_username("")
        .and_then(|_| url.set_password(None))
        .map_err(|_| Error::InvalidDetail("connection URI cannot carry user info".to_string()))?;
    let database = url.path().trim_start_matches('/').to_string();
    Ok((url.to_string(), database))
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
}

impl ConditionBuilder {
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
        }
    }

    /// Set a condition, updating if it exists or adding if it doesn't
    ///
    /// The transition time only moves when the status changes.
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = now;
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
                observed_generation: self.generation,
            });
        }
        self
    }

    /// Set the SpecSynced condition
    pub fn synced(self, synced: bool, reason: &str, message: &str) -> Self {
        let status = if synced {
            condition_status::TRUE
        } else {
            condition_status::FALSE
        };
        self.set_condition(condition_types::SPEC_SYNCED, status, reason, message)
    }

    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

/// Teams as reported in status, with the personal team renamed
pub fn team_statuses(list: &TeamList) -> Vec<TeamStatus> {
    list.teams
        .iter()
        .map(|team| TeamStatus {
            id: team.id.clone(),
            name: if team.is_personal {
                PERSONAL_TEAM_NAME.to_string()
            } else {
                team.name.clone()
            },
        })
        .collect()
}
