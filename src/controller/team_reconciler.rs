//! Reconciliation logic for BridgeTeam resources
//!
//! Each pass lists the teams visible to the referenced key pair and mirrors
//! them into status together with a `SpecSynced` condition. Status is only
//! written when it changed, so a pass never triggers another one by itself.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, error, info, instrument, warn};

use crate::bridgeapi::ApiError;
use crate::controller::error::{Error, Result, StoreError, delay_for_error};
use crate::controller::reconciler::CONFLICT_REQUEUE;
use crate::controller::status::condition_reasons::{AUTHENTICATION_ERROR, BACKEND_ERROR, SYNC_OK};
use crate::controller::status::{ConditionBuilder, team_statuses};
use crate::controller::team_context::TeamContext;
use crate::crd::{BridgeTeam, BridgeTeamStatus};

/// Condition message after a successful discovery
pub const TEAMS_SYNCED_MESSAGE: &str = "Successfully discovered Crunchy Bridge teams";

fn object_key(team: &BridgeTeam) -> String {
    format!("{}/{}", team.namespace().unwrap_or_default(), team.name_any())
}

/// Errors that mean the key pair itself is unusable
fn is_authentication_error(e: &ApiError) -> bool {
    e.is_login_state()
        || matches!(
            e,
            ApiError::Credential(_) | ApiError::ApiUnset | ApiError::InvalidUrl(_)
        )
}

/// Main reconciliation function
#[instrument(skip(team, ctx), fields(name = %team.name_any(), namespace = team.namespace().unwrap_or_default()))]
pub async fn reconcile_team(team: Arc<BridgeTeam>, ctx: Arc<TeamContext>) -> Result<Action> {
    let start = Instant::now();
    let ns = team
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = team.name_any();
    let key = object_key(&team);

    debug!("Reconciling BridgeTeam");
    match sync_team(&ns, &name, &ctx).await {
        Ok(action) => {
            ctx.failures.clear(&key);
            if let Some(health) = &ctx.health {
                health
                    .metrics
                    .record_reconcile(&ns, &name, start.elapsed().as_secs_f64());
            }
            Ok(action)
        }
        Err(e) if e.is_conflict() => {
            debug!("Resource changed during reconcile, requeuing: {}", e);
            Ok(Action::requeue(CONFLICT_REQUEUE))
        }
        Err(e) => {
            if let Some(health) = &ctx.health {
                health.metrics.record_error(&ns, &name, e.kind());
            }
            Err(e)
        }
    }
}

/// Error policy for the BridgeTeam controller
pub fn team_error_policy(team: Arc<BridgeTeam>, error: &Error, ctx: Arc<TeamContext>) -> Action {
    let key = object_key(&team);
    let attempt = ctx.failures.record(&key);
    let delay = delay_for_error(&ctx.backoff, error, attempt);

    if error.is_retryable() {
        warn!(
            "Retryable error for BridgeTeam {} (attempt {}): {}, requeuing in {:?}",
            key,
            attempt + 1,
            error,
            delay
        );
    } else {
        error!(
            "Non-retryable error for BridgeTeam {}: {}, requeuing in {:?}",
            key, error, delay
        );
    }

    Action::requeue(delay)
}

async fn sync_team(ns: &str, name: &str, ctx: &TeamContext) -> Result<Action> {
    let team = match ctx.store.get(ns, name).await {
        Ok(team) => team,
        Err(StoreError::NotFound(_)) => {
            debug!("BridgeTeam no longer exists");
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e.into()),
    };

    let secret_name = team.spec.credentials_ref.name.trim();
    let secret_ns = team.credentials_namespace().unwrap_or(ns);
    let listing = if secret_name.is_empty() {
        Err(ApiError::CredUnset)
    } else {
        ctx.directory.list_teams(secret_ns, secret_name).await
    };

    let mut status = team.status.clone().unwrap_or_default();
    let conditions = ConditionBuilder::from_existing(
        std::mem::take(&mut status.conditions),
        team.metadata.generation,
    );

    match listing {
        Ok(list) => {
            status.teams = team_statuses(&list);
            status.conditions = conditions
                .synced(true, SYNC_OK, TEAMS_SYNCED_MESSAGE)
                .build();
            if write_status(team, status, ctx).await? {
                info!(teams = list.teams.len(), "Discovered teams");
            }
            Ok(Action::await_change())
        }
        Err(e) => {
            let reason = if is_authentication_error(&e) {
                AUTHENTICATION_ERROR
            } else {
                BACKEND_ERROR
            };
            status.conditions = conditions.synced(false, reason, &e.to_string()).build();
            write_status(team, status, ctx).await?;
            Err(e.into())
        }
    }
}

/// Write the status if it differs from the stored one, reporting whether it did
async fn write_status(
    mut team: BridgeTeam,
    status: BridgeTeamStatus,
    ctx: &TeamContext,
) -> Result<bool> {
    if team.status.as_ref() == Some(&status) {
        return Ok(false);
    }
    team.status = Some(status);
    ctx.store.update_status(&team).await?;
    Ok(true)
}
