//! Create-request construction from a BridgeCluster spec

use crate::bridgeapi::CreateRequest;
use crate::crd::BridgeClusterSpec;

/// Plan name that requests the free trial configuration
pub const TRIAL_PLAN: &str = "trial";
const TRIAL_PROVISION_PLAN: &str = "hobby-2";
const TRIAL_STORAGE_GB: i32 = 10;
const TRIAL_PROVIDER: &str = "aws";
const TRIAL_REGION: &str = "us-east-1";

/// Build the provider create request for a spec and a resolved team id
///
/// A `trial` plan is rewritten to the fixed trial shape. Trials only run on
/// AWS, so other providers are moved to the default AWS region while an AWS
/// request keeps its region.
pub fn create_request(spec: &BridgeClusterSpec, team_id: &str) -> CreateRequest {
    let mut req = CreateRequest {
        name: spec.name.clone(),
        team_id: team_id.to_string(),
        plan: spec.plan.clone(),
        storage: spec.storage,
        provider: spec.provider.clone(),
        region: spec.region.clone(),
        major_version: spec.pg_major_version,
        is_ha: spec.enable_ha,
    };

    if req.plan == TRIAL_PLAN {
        req.plan = TRIAL_PROVISION_PLAN.to_string();
        req.storage = TRIAL_STORAGE_GB;
        req.is_ha = false;
        if spec.provider != TRIAL_PROVIDER {
            req.provider = TRIAL_PROVIDER.to_string();
            req.region = TRIAL_REGION.to_string();
        }
    }
    req
}

/// Team id from the spec, if it names one
pub fn spec_team_id(spec: &BridgeClusterSpec) -> Option<&str> {
    spec.team_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
}
